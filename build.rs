// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

fn main() {
    if cfg!(not(feature = "link-libs")) {
        return;
    }

    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os == "ios" || target_os == "macos" {
        let frameworks = [
            "AVFoundation", "CoreFoundation", "CoreMedia", "CoreVideo", "Foundation", "Metal", "QuartzCore",
        ];
        for x in frameworks {
            println!("cargo:rustc-link-lib=framework={x}");
        }
    }
    if cfg!(feature = "ffmpeg") {
        println!("cargo:rerun-if-env-changed=FFMPEG_DIR");
        let Ok(ffmpeg_dir) = std::env::var("FFMPEG_DIR") else {
            // ffmpeg-sys finds the libraries on its own
            return;
        };
        match target_os.as_str() {
            "android" => {
                println!("cargo:rustc-link-search={ffmpeg_dir}/lib/arm64-v8a");
                println!("cargo:rustc-link-search={ffmpeg_dir}/lib");
            },
            "macos" | "ios" => {
                println!("cargo:rustc-link-search={ffmpeg_dir}/lib");
                println!("cargo:rustc-link-lib=z");
                println!("cargo:rustc-link-lib=bz2");
                println!("cargo:rustc-link-lib=framework=VideoToolbox");
                println!("cargo:rustc-link-lib=framework=AudioToolbox");
                println!("cargo:rustc-link-lib=framework=CoreServices");
                println!("cargo:rustc-link-lib=framework=Security");
            },
            "linux" => {
                println!("cargo:rustc-link-search={ffmpeg_dir}/lib/amd64");
                println!("cargo:rustc-link-search={ffmpeg_dir}/lib");
            },
            "windows" => {
                println!("cargo:rustc-link-search={ffmpeg_dir}\\lib\\x64");
                println!("cargo:rustc-link-search={ffmpeg_dir}\\lib");
            }
            tos => panic!("unknown target os {:?}!", tos)
        }
    }
}
