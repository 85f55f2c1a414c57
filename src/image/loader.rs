use crate::Result;
use image::{DynamicImage, ImageReader};
use std::path::Path;

/// 允许上传的文件扩展名
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub struct ImageLoader;

impl ImageLoader {
    /// 检查文件名扩展名是否在白名单内（大小写不敏感）
    pub fn is_allowed_file(file_name: &str) -> bool {
        file_name
            .rsplit_once('.')
            .map(|(_, ext)| {
                let ext = ext.to_ascii_lowercase();
                ALLOWED_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false)
    }

    /// 将客户端提供的文件名清洗为安全的本地文件名
    ///
    /// 只保留 ASCII 字母数字和 `._-`，空白折叠为 `_`，去掉首尾的 `.` 和 `_`，
    /// 路径分隔符视为空白，因此结果不会逃出上传目录。
    pub fn secure_filename(file_name: &str) -> String {
        let ascii: String = file_name
            .chars()
            .filter(char::is_ascii)
            .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
            .collect();

        let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");

        let cleaned: String = joined
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
            .collect();

        let cleaned = cleaned.trim_matches(|c| c == '.' || c == '_');
        if cleaned.is_empty() {
            "upload".to_string()
        } else {
            cleaned.to_string()
        }
    }

    /// 从文件路径加载图像，格式按内容识别而不是扩展名
    pub fn from_path(path: &Path) -> Result<DynamicImage> {
        let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;

        tracing::debug!(
            "Decoded {}: {}x{} {:?}",
            path.display(),
            image.width(),
            image.height(),
            image.color()
        );

        Ok(image)
    }
}
