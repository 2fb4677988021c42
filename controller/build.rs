fn main() {
    // Emits esp-idf link directives on esp32 builds; a no-op on the host.
    #[cfg(feature = "esp32")]
    embuild::espidf::sysenv::output();
}
