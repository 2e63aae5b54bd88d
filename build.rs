use chrono::Utc;

fn main() {
    println!(
        "cargo:rustc-env=BUILD_DATE={}",
        Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    );
    println!("cargo:rerun-if-changed=build.rs");
}
