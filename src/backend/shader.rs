// Shader module loading
//
// SPIR-V binaries are read from disk at startup. Contents are opaque; only
// the word size and magic number are checked before handing the code to the
// driver.

use ash::util::read_spv;
use ash::vk;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use super::error::{InitError, InitResult};
use super::Device;

fn read_spirv(path: &Path) -> InitResult<Vec<u32>> {
    let bytes = std::fs::read(path).map_err(|source| InitError::ShaderRead {
        path: path.to_path_buf(),
        source,
    })?;
    read_spv(&mut Cursor::new(&bytes)).map_err(|source| InitError::ShaderRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Shader module wrapper. Lives only as long as pipeline creation needs it;
/// dropping it destroys the module even when pipeline creation failed.
pub struct ShaderModule {
    pub handle: vk::ShaderModule,
    device: Arc<Device>,
}

impl ShaderModule {
    pub fn load(device: Arc<Device>, path: impl AsRef<Path>) -> InitResult<Self> {
        let path = path.as_ref();
        let code = read_spirv(path)?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let handle = unsafe { device.handle.create_shader_module(&create_info, None) }
            .map_err(InitError::vulkan("creating a shader module"))?;

        log::debug!("Loaded shader {:?} ({} words)", path, code.len());

        Ok(Self { handle, device })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.handle.destroy_shader_module(self.handle, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("vk-triangle-{}-{}", std::process::id(), name))
    }

    #[test]
    fn missing_shader_reports_the_path() {
        let path = temp_path("missing.spv");
        let err = read_spirv(&path).unwrap_err();
        assert!(matches!(err, InitError::ShaderRead { .. }));
        assert!(err.to_string().contains("missing.spv"));
    }

    #[test]
    fn truncated_shader_is_rejected() {
        let path = temp_path("truncated.spv");
        std::fs::write(&path, [0x03, 0x02, 0x23]).unwrap();
        let err = read_spirv(&path).unwrap_err();
        assert!(matches!(err, InitError::ShaderRead { .. }));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn spirv_words_survive_the_read() {
        let path = temp_path("magic.spv");
        std::fs::write(&path, 0x0723_0203_u32.to_le_bytes()).unwrap();
        let words = read_spirv(&path).unwrap();
        assert_eq!(words, vec![0x0723_0203]);
        std::fs::remove_file(&path).unwrap();
    }
}
