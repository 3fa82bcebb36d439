// build.rs
// Compiles the GLSL shaders in resources/shaders to SPIR-V with glslc

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_STAGES: [&str; 2] = ["vert", "frag"];

/// Compile one shader if its SPIR-V output is missing or older than the source
///
/// Output keeps the stage extension so `mesh.vert` and `mesh.frag` do not
/// collide: `mesh.vert` -> `mesh.vert.spv`.
fn compile_shader(path: &Path, target_dir: &Path, glslc: &str) -> bool {
    let Some(file_name) = path.file_name() else {
        return false;
    };
    let mut out_name = file_name.to_os_string();
    out_name.push(".spv");
    let out_file = target_dir.join(out_name);

    let up_to_date = match (std::fs::metadata(path), std::fs::metadata(&out_file)) {
        (Ok(src), Ok(dst)) => match (src.modified(), dst.modified()) {
            (Ok(src_time), Ok(dst_time)) => dst_time >= src_time,
            _ => false,
        },
        _ => false,
    };
    if up_to_date {
        eprintln!("info: Shader {:?} is up to date", file_name);
        return false;
    }

    let status = Command::new(glslc).arg(path).arg("-o").arg(&out_file).status();
    match status {
        Ok(s) if s.success() => {
            eprintln!("info: Compiled {:?} -> {:?}", file_name, out_file);
            true
        }
        Ok(s) => {
            eprintln!("error: glslc failed for {:?} with exit code: {}", path, s.code().unwrap_or(-1));
            panic!("Shader compilation failed");
        }
        Err(e) => {
            eprintln!("error: Failed to run glslc for {:?}: {}", path, e);
            panic!("Failed to execute shader compiler");
        }
    }
}

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string()));
    let workspace_root = manifest_dir.join("../..");
    let shader_dir = workspace_root.join("resources/shaders");
    let target_dir = workspace_root.join("target/shaders");

    println!("cargo:rerun-if-changed={}", shader_dir.display());
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
        eprintln!("hint: Install Vulkan SDK and set VULKAN_SDK environment variable");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        format!("{}\\Bin\\glslc.exe", vulkan_sdk)
    } else {
        format!("{}/bin/glslc", vulkan_sdk)
    };
    if !Path::new(&glslc).exists() {
        eprintln!("error: glslc not found at: {}", glslc);
        eprintln!("hint: Ensure Vulkan SDK is properly installed");
        panic!("Shader compiler not found");
    }

    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        eprintln!("warning: Failed to create target directory: {}", e);
        return;
    }

    let entries = match std::fs::read_dir(&shader_dir) {
        Ok(entries) => entries,
        Err(_) => {
            eprintln!("info: No shader directory found at: {:?}", shader_dir);
            return;
        }
    };

    let mut compiled = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_stage = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SHADER_STAGES.contains(&ext));
        if is_stage && compile_shader(&path, &target_dir, &glslc) {
            compiled += 1;
        }
    }

    if compiled > 0 {
        eprintln!("info: Successfully compiled {} shader(s)", compiled);
    } else {
        eprintln!("info: All shaders are up to date");
    }
}
