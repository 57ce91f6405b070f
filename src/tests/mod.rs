//! Cross-module scenario tests

mod key_handoff_tests;
mod signing_concurrency_tests;
