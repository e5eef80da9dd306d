//! End-to-end tests for the relay gateway live under `tests/`.
