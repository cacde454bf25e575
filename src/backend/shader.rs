// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. Shaders are compiled by build.rs and
// read from disk at runtime so they can be hot-reloaded.

use anyhow::{Context, Result};
use ash::vk;
use std::path::Path;

use super::VulkanDevice;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode SPIR-V bytes into 32-bit words, fixing up byte order if needed
pub fn decode_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        anyhow::bail!(
            "SPIR-V length must be a non-zero multiple of 4, got {} bytes",
            bytes.len()
        );
    }

    let mut words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect();

    match words[0] {
        SPIRV_MAGIC => {}
        magic if magic == SPIRV_MAGIC.swap_bytes() => {
            for word in &mut words {
                *word = word.swap_bytes();
            }
        }
        magic => anyhow::bail!("Not a SPIR-V module (magic {:#010x})", magic),
    }

    Ok(words)
}

/// Load a compiled shader from disk and create a shader module
pub fn load_shader_module(device: &VulkanDevice, path: &Path) -> Result<vk::ShaderModule> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read shader {:?} (was it compiled?)", path))?;
    let code = decode_spirv(&bytes).with_context(|| format!("Invalid shader {:?}", path))?;

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

    log::debug!("Loaded shader {:?} ({} words)", path, code.len());

    unsafe {
        device
            .device
            .create_shader_module(&create_info, None)
            .with_context(|| format!("Failed to create shader module for {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(magic: [u8; 4]) -> Vec<u8> {
        let mut bytes = magic.to_vec();
        // version, generator, bound, schema
        bytes.extend_from_slice(&[0, 0, 1, 0, 0, 0, 0, 0, 8, 0, 0, 0, 0, 0, 0, 0]);
        bytes
    }

    #[test]
    fn decodes_little_endian_module() {
        let words = decode_spirv(&header(SPIRV_MAGIC.to_le_bytes())).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
        assert_eq!(words[3], 8);
    }

    #[test]
    fn swaps_big_endian_module() {
        let mut bytes = SPIRV_MAGIC.to_be_bytes().to_vec();
        bytes.extend_from_slice(&8u32.to_be_bytes());
        let words = decode_spirv(&bytes).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 8]);
    }

    #[test]
    fn rejects_truncated_bytes() {
        let mut bytes = header(SPIRV_MAGIC.to_le_bytes());
        bytes.pop();
        assert!(decode_spirv(&bytes).is_err());
        assert!(decode_spirv(&[]).is_err());
    }

    #[test]
    fn rejects_wrong_magic() {
        let err = decode_spirv(&header(*b"GLSL")).unwrap_err();
        assert!(err.to_string().contains("Not a SPIR-V module"));
    }
}
