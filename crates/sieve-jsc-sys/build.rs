use std::env;
use std::fs;
use std::path::{Path, PathBuf};

// Pinned oven-sh/WebKit autobuild. Override with BUN_WEBKIT_VERSION.
const DEFAULT_WEBKIT_BUILD: &str = "aaf3f80b1cc701b412f8abfb7c7f413644a229ff";

fn main() {
    println!("cargo:rustc-check-cfg=cfg(has_bmalloc)");
    println!("cargo:rerun-if-env-changed=BUN_WEBKIT_VERSION");
    println!("cargo:rerun-if-env-changed=SIEVE_WEBKIT_DIR");

    let os = env::var("CARGO_CFG_TARGET_OS").unwrap();
    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap();

    if os == "macos" {
        link_system_framework();
        return;
    }

    let arch = match (os.as_str(), arch.as_str()) {
        ("linux", "x86_64") | ("windows", "x86_64") => "amd64",
        ("linux", "aarch64") => "arm64",
        _ => panic!("no JavaScriptCore build available for {os}/{arch}"),
    };

    let webkit_dir = match env::var("SIEVE_WEBKIT_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => fetch_webkit(&os, arch),
    };
    link_static_webkit(&webkit_dir, &os);
}

fn link_system_framework() {
    println!("cargo:rustc-link-lib=framework=JavaScriptCore");

    let sdk = std::process::Command::new("xcrun")
        .arg("--show-sdk-path")
        .output();
    if let Ok(out) = sdk {
        let path = String::from_utf8_lossy(&out.stdout);
        println!(
            "cargo:rustc-link-search=framework={}/System/Library/Frameworks",
            path.trim()
        );
    }
}

fn fetch_webkit(os: &str, arch: &str) -> PathBuf {
    let build =
        env::var("BUN_WEBKIT_VERSION").unwrap_or_else(|_| DEFAULT_WEBKIT_BUILD.to_string());
    let target_dir = cache_root().join(&build).join(format!("{os}-{arch}"));
    let marker = target_dir.join(".complete");

    if marker.exists() {
        return target_dir;
    }

    let url = format!(
        "https://github.com/oven-sh/WebKit/releases/download/autobuild-{build}/bun-webkit-{os}-{arch}.tar.gz"
    );
    println!("cargo:warning=fetching bun-webkit from {url}");

    fs::create_dir_all(&target_dir).expect("create bun-webkit cache directory");

    let response = ureq::get(&url)
        .call()
        .unwrap_or_else(|e| panic!("bun-webkit download failed ({e}): {url}"));

    // Stream into the decoder; the archive is too large to buffer.
    let body = response.into_body().into_reader();
    tar::Archive::new(flate2::read::GzDecoder::new(body))
        .unpack(&target_dir)
        .expect("unpack bun-webkit archive");

    fs::write(&marker, build).expect("write bun-webkit marker");
    target_dir
}

fn link_static_webkit(webkit_dir: &Path, os: &str) {
    let lib_dir = locate_lib_dir(webkit_dir);
    println!("cargo:rustc-link-search=native={}", lib_dir.display());

    println!("cargo:rustc-link-lib=static=JavaScriptCore");
    println!("cargo:rustc-link-lib=static=WTF");

    // Some Windows archives fold bmalloc into WTF.
    if has_archive(&lib_dir, "bmalloc") {
        println!("cargo:rustc-link-lib=static=bmalloc");
        println!("cargo:rustc-cfg=has_bmalloc");
    }

    let icu: &[&str] = if has_archive(&lib_dir, "icudata") {
        &["icudata", "icui18n", "icuuc"]
    } else if has_archive(&lib_dir, "sicudt") {
        &["sicudt", "sicuin", "sicuuc"]
    } else {
        println!("cargo:warning=no ICU archives in {}", lib_dir.display());
        &[]
    };
    for lib in icu {
        println!("cargo:rustc-link-lib=static={lib}");
    }

    match os {
        "linux" => {
            for lib in ["stdc++", "atomic", "dl", "pthread", "m"] {
                println!("cargo:rustc-link-lib={lib}");
            }
        }
        "windows" => {
            for lib in [
                "winmm", "bcrypt", "ntdll", "userenv", "dbghelp", "crypt32", "wsock32", "ws2_32",
                "advapi32", "ole32", "oleaut32", "uuid", "shell32",
            ] {
                println!("cargo:rustc-link-lib={lib}");
            }
            println!("cargo:rustc-link-arg=/NODEFAULTLIB:libcmt");
            println!("cargo:rustc-link-lib=msvcrt");
        }
        _ => {}
    }

    let include_dir = webkit_dir.join("include");
    if include_dir.exists() {
        println!("cargo:include={}", include_dir.display());
    }
}

/// bun-webkit archives unpack either directly or into one top-level folder.
fn locate_lib_dir(webkit_dir: &Path) -> PathBuf {
    let direct = webkit_dir.join("lib");
    if direct.exists() {
        return direct;
    }

    fs::read_dir(webkit_dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|entry| entry.path().join("lib"))
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| webkit_dir.to_path_buf())
}

fn has_archive(lib_dir: &Path, name: &str) -> bool {
    let unix_prefix = format!("lib{name}");
    fs::read_dir(lib_dir)
        .into_iter()
        .flatten()
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .any(|file| {
            (file.starts_with(name) || file.starts_with(&unix_prefix))
                && (file.ends_with(".a") || file.ends_with(".lib"))
        })
}

fn cache_root() -> PathBuf {
    if let Ok(cargo_home) = env::var("CARGO_HOME") {
        return PathBuf::from(cargo_home).join("cache").join("bun-webkit");
    }

    ["HOME", "USERPROFILE"]
        .iter()
        .find_map(|var| env::var(var).ok())
        .map(|home| PathBuf::from(home).join(".cargo").join("cache").join("bun-webkit"))
        .unwrap_or_else(|| PathBuf::from(env::var("OUT_DIR").unwrap()).join("bun-webkit"))
}
