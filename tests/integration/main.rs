//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the orchestrator against
//! a mock controller board. All tests run on the host (x86_64) with no
//! radio required.

mod button_tests;
mod fault_tests;
mod mock_link;
mod orchestrator_tests;
