//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises a subsystem against the
//! mock adapters in `mock_hw`. Everything runs on the host with no real
//! hardware.

mod dryer_service_tests;
mod mock_hw;
mod recovery_tests;
