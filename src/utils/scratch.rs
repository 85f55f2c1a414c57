use std::path::{Path, PathBuf};

/// 上传的临时文件，离开作用域时无条件删除
///
/// 在写入之前创建，这样写了一半的文件也会被清理。删除失败只记录日志。
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn new(dir: &Path, file_name: &str) -> Self {
        Self {
            path: dir.join(file_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed scratch file: {}", self.path.display()),
            Err(e) => tracing::warn!(
                "Could not remove scratch file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}
