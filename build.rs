use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=FFMPEG_DIR");
    println!("cargo:rerun-if-env-changed=VCPKG_ROOT");

    // FFmpeg discovery is handled by ffmpeg-sys-next; on Windows the only
    // reliable setup is vcpkg, so surface a hint when neither variable is
    // configured.
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os == "windows"
        && env::var_os("FFMPEG_DIR").is_none()
        && env::var_os("VCPKG_ROOT").is_none()
    {
        println!(
            "cargo:warning=FFMPEG_DIR is not set. On Windows, install FFmpeg via vcpkg and set VCPKG_ROOT + FFMPEG_DIR for reliable builds."
        );
    }
}
