//! Fuzz target for the package and model readers.
//!
//! Arbitrary bytes must decode or fail with an error, never panic.
//!
//! Run with:
//! ```sh
//! cargo +nightly fuzz run fuzz_package_read
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;

use modelpack::model::decode_model;
use modelpack::package::ModelPackage;

fuzz_target!(|data: &[u8]| {
    let _ = ModelPackage::from_bytes(data);
    let _ = decode_model(data);
});
