//! Links against the board's vendor Rockchip MPP shared library.
//!
//! There is no crates.io binding for `librockchip_mpp`; the board image
//! installs it as a system shared library (typically under
//! `/usr/lib` or `/oem/usr/lib` on Rockchip SDK-derived rootfs images).
//! `KVM_MPP_LIB_DIR` lets a cross-compilation sysroot override the search
//! path; otherwise we rely on the linker's default search paths.

fn main() {
    if let Ok(dir) = std::env::var("KVM_MPP_LIB_DIR") {
        println!("cargo:rustc-link-search=native={dir}");
    }
    println!("cargo:rustc-link-lib=dylib=rockchip_mpp");
    println!("cargo:rerun-if-env-changed=KVM_MPP_LIB_DIR");
}
