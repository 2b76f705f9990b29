//! Generates Swift and Kotlin bindings for `vaultly-core`.

fn main() {
    uniffi::uniffi_bindgen_main();
}
