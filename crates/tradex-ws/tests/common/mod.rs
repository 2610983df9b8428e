//! Shared helpers for tradex-ws integration tests.

pub mod mock_ws;
