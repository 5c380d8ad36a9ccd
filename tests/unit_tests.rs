//! Unit test entry point for `tests/unit`.

mod unit;
