//! Integration test modules

mod file_tests;
mod local_tests;
mod mock_ssh;
mod remote_tests;
mod tail_tests;
mod timeout_tests;
