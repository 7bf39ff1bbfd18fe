//! Integration test harness: full controller scans against a scripted
//! field simulator, no real transport.

mod mock_io;

mod controller_tests;
mod scenario_tests;
