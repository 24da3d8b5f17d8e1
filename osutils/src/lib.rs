pub mod blkid;
pub mod dependencies;
pub mod filesystem;
pub mod path;

#[cfg(any(test, feature = "test-utilities"))]
pub mod testutils;
