use sha2::{Digest, Sha256};
use std::{fs::File, io::Read, path::Path};

use crate::Result;

/// 计算文件的 SHA-256，返回小写十六进制字符串。
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// 与期望值比较（忽略大小写与首尾空白），返回实际计算出的摘要。
pub fn verify_sha256(path: &Path, expected: &str) -> Result<(bool, String)> {
    let actual = sha256_file(path)?;
    Ok((actual.eq_ignore_ascii_case(expected.trim()), actual))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const HELLO_WORLD: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_sha256_calculation() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test.txt");
        fs::write(&path, b"hello world").unwrap();

        assert_eq!(sha256_file(&path)?, HELLO_WORLD);
        Ok(())
    }

    #[test]
    fn test_verify_ignores_case() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test.txt");
        fs::write(&path, b"hello world").unwrap();

        let (ok, actual) = verify_sha256(&path, &HELLO_WORLD.to_uppercase())?;
        assert!(ok);
        assert_eq!(actual, HELLO_WORLD);

        let (ok, _) = verify_sha256(&path, "deadbeef")?;
        assert!(!ok);
        Ok(())
    }
}
