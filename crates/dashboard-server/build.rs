fn main() {
    // Re-embed the stylesheet when it changes
    println!("cargo:rerun-if-changed=assets/");
}
