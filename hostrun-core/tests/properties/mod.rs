//! Property test modules

mod controls_tests;
mod format_tests;
