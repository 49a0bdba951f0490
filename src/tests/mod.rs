//! Unit test suite for the weaving engine







#[cfg(test)]
mod weaver_tests;
