//! 存储数据类型定义

use std::collections::BTreeMap;

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// 单个命名 blob 的内容：key -> 序列化后的值
///
/// 使用有序 map，使扫描结果和 key 降序的决胜规则都是确定的
pub type Records = BTreeMap<String, String>;

/// 从后端读取的一份快照
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub records: Records,
    /// 版本号，0 表示该 blob 尚不存在
    pub version: u64,
}

impl Snapshot {
    pub fn new(records: Records, version: u64) -> Self {
        Self { records, version }
    }
}

/// 与 OpenID provider 协商出的共享密钥
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    /// provider 选择的不透明标识
    pub handle: String,
    /// 共享密钥
    pub secret: Vec<u8>,
    /// 签发时间（Unix 秒）
    pub issued: i64,
    /// 有效期（秒）
    pub lifetime: i64,
    /// 签名算法，如 `HMAC-SHA1` / `HMAC-SHA256`
    pub assoc_type: String,
}

const SERIALIZATION_VERSION: &str = "2";
const FIELD_ORDER: [&str; 6] = [
    "version",
    "handle",
    "secret",
    "issued",
    "lifetime",
    "assoc_type",
];

impl Association {
    pub fn new(
        handle: impl Into<String>,
        secret: impl Into<Vec<u8>>,
        issued: i64,
        lifetime: i64,
        assoc_type: impl Into<String>,
    ) -> Self {
        Self {
            handle: handle.into(),
            secret: secret.into(),
            issued,
            lifetime,
            assoc_type: assoc_type.into(),
        }
    }

    /// 距离过期的剩余秒数，已过期时为非正数，溢出时取 `i64` 边界
    pub fn expires_in(&self, now: i64) -> i64 {
        self.issued.saturating_add(self.lifetime).saturating_sub(now)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_in(now) <= 0
    }

    /// 序列化为 OpenID key-value 格式，每行 `key:value\n`
    pub fn serialize(&self) -> String {
        let secret = BASE64_STANDARD.encode(&self.secret);
        let issued = self.issued.to_string();
        let lifetime = self.lifetime.to_string();
        let values = [
            SERIALIZATION_VERSION,
            self.handle.as_str(),
            secret.as_str(),
            issued.as_str(),
            lifetime.as_str(),
            self.assoc_type.as_str(),
        ];

        FIELD_ORDER
            .iter()
            .zip(values)
            .map(|(field, value)| format!("{field}:{value}\n"))
            .collect()
    }

    /// 从 key-value 格式解析
    ///
    /// # Arguments
    /// * `key` - 记录所在的存储 key，仅用于错误信息
    /// * `data` - 序列化内容
    pub fn deserialize(key: &str, data: &str) -> StoreResult<Self> {
        let mut fields: BTreeMap<&str, &str> = BTreeMap::new();
        for line in data.lines().filter(|l| !l.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| StoreError::corrupt(key, format!("invalid line '{line}'")))?;
            fields.insert(name, value);
        }

        let field = |name: &str| {
            fields
                .get(name)
                .copied()
                .ok_or_else(|| StoreError::corrupt(key, format!("missing field '{name}'")))
        };
        let number = |name: &str| -> StoreResult<i64> {
            field(name)?
                .parse()
                .map_err(|e| StoreError::corrupt(key, format!("invalid {name}: {e}")))
        };

        let version = field("version")?;
        if version != SERIALIZATION_VERSION {
            return Err(StoreError::corrupt(
                key,
                format!("unsupported version '{version}'"),
            ));
        }

        let secret = BASE64_STANDARD
            .decode(field("secret")?)
            .map_err(|e| StoreError::corrupt(key, format!("invalid secret: {e}")))?;

        Ok(Self {
            handle: field("handle")?.to_string(),
            secret,
            issued: number("issued")?,
            lifetime: number("lifetime")?,
            assoc_type: field("assoc_type")?.to_string(),
        })
    }
}

/// 存储统计信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub backend: &'static str,
    pub associations: usize,
    pub nonces: usize,
}

/// 一次清理的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub associations_removed: usize,
    pub nonces_removed: usize,
}
