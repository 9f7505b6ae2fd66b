#![allow(dead_code)] // Test utility module - not all helpers used in every test

pub mod mock_destination;
pub mod mock_transport;
