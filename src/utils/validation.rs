use crate::utils::error::{Result, SyncError};
use std::path::Path;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// 設定區段 (`run`、`source`、`destination`)，錯誤訊息中的欄位以 `區段.欄位` 表示
#[derive(Debug, Clone, Copy)]
pub struct Section<'a>(pub &'a str);

impl Section<'_> {
    pub fn field(&self, key: &str) -> String {
        format!("{}.{}", self.0, key)
    }

    fn invalid(&self, key: &str, value: impl ToString, reason: impl Into<String>) -> SyncError {
        SyncError::InvalidConfigValueError {
            field: self.field(key),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn require<'v, T>(&self, key: &str, value: &'v Option<T>) -> Result<&'v T> {
        value.as_ref().ok_or_else(|| SyncError::MissingConfigError {
            field: self.field(key),
        })
    }

    /// 倉儲端點必須是帶有主機名稱的 http(s) URL
    pub fn endpoint(&self, key: &str, raw: &str) -> Result<Url> {
        let url = Url::parse(raw).map_err(|e| self.invalid(key, raw, format!("not a URL ({})", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(self.invalid(key, raw, format!("scheme '{}' is not http or https", url.scheme())));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(self.invalid(key, raw, "URL has no host"));
        }
        Ok(url)
    }

    /// JSON Lines 檔案路徑；檔案可以尚未存在，但不能是目錄
    pub fn file_path(&self, key: &str, raw: &str) -> Result<()> {
        if raw.trim().is_empty() {
            return Err(self.invalid(key, raw, "path is blank"));
        }
        if raw.contains('\0') {
            return Err(self.invalid(key, raw.escape_debug(), "path contains a NUL byte"));
        }
        if Path::new(raw).is_dir() {
            return Err(self.invalid(key, raw, "path is a directory"));
        }
        Ok(())
    }

    /// 未設定時使用預設值，不檢查
    pub fn at_least(&self, key: &str, value: Option<usize>, min: usize) -> Result<()> {
        match value {
            Some(v) if v < min => Err(self.invalid(key, v, format!("must be {} or more", min))),
            _ => Ok(()),
        }
    }

    pub fn non_blank(&self, key: &str, value: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(self.invalid(key, value, "must not be blank"));
        }
        Ok(())
    }
}
