// Build script to compile GLSL shaders to SPIR-V

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=shaders/");

    // Compile shaders using glslc (part of the Vulkan SDK)
    let glslc = find_glslc();
    compile_shader(&glslc, "shaders/triangle.vert", "shaders/triangle.vert.spv");
    compile_shader(&glslc, "shaders/triangle.frag", "shaders/triangle.frag.spv");
}

/// Use glslc from VULKAN_SDK when it is installed there, otherwise rely on PATH.
fn find_glslc() -> PathBuf {
    if let Ok(sdk) = env::var("VULKAN_SDK") {
        let candidate = Path::new(&sdk).join("bin").join("glslc");
        if candidate.exists() {
            return candidate;
        }
    }
    PathBuf::from("glslc")
}

fn compile_shader(glslc: &Path, input: &str, output: &str) {
    let result = Command::new(glslc).arg(input).arg("-o").arg(output).status();

    match result {
        Ok(status) if status.success() => {
            println!("Compiled {} -> {}", input, output);
        }
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input, status.code());
        }
        Err(e) => {
            eprintln!("Warning: glslc not found ({})", e);
            eprintln!("Shaders will not be compiled. Install the Vulkan SDK or compile manually:");
            eprintln!("  glslc {} -o {}", input, output);
        }
    }
}
