mod common;
mod config_store_tests;
