//! 存储 key 派生
//!
//! association 与 nonce 的 key 都由 `scheme`、`domain` 以及 base64 编码后的
//! URL / handle / salt 拼接而成。编码保证各段中不会出现分隔符 `-`，
//! 空 handle 编码为空段，使 `association_prefix` 可以用作前缀匹配。
//!
//! nonce key 以 8 位（至少）十六进制时间戳开头，字典序即时间序。
//! 时间戳必须非负，负数的十六进制补码会排在所有正数之后。

use base64::prelude::*;
use tracing::warn;

use crate::error::{StoreError, StoreResult};

/// URL 的 scheme 与 domain 两部分
#[derive(Debug, Clone, PartialEq, Eq)]
struct UrlParts<'a> {
    scheme: &'a str,
    domain: &'a str,
}

fn split_url(server_url: &str) -> StoreResult<UrlParts<'_>> {
    let Some((scheme, rest)) = server_url.split_once("://") else {
        warn!("Bad server URL: {}", server_url);
        return Err(StoreError::MalformedUrl(server_url.to_string()));
    };
    let domain = rest.split('/').next().unwrap_or_default();
    Ok(UrlParts { scheme, domain })
}

fn encode(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        BASE64_STANDARD.encode(value.as_bytes())
    }
}

/// 派生 association key：`{scheme}-{domain}-{b64(url)}-{b64(handle)}`
///
/// # Errors
/// `server_url` 不含 `://` 时返回 [`StoreError::MalformedUrl`]
pub fn association_key(server_url: &str, handle: &str) -> StoreResult<String> {
    let parts = split_url(server_url)?;
    Ok(format!(
        "{}-{}-{}-{}",
        parts.scheme,
        parts.domain,
        encode(server_url),
        encode(handle)
    ))
}

/// 同一 server URL 下所有 association key 的公共前缀
pub fn association_prefix(server_url: &str) -> StoreResult<String> {
    association_key(server_url, "")
}

/// 派生 nonce key：`{timestamp:08x}-{scheme}-{domain}-{b64(url)}-{b64(salt)}`
///
/// 空 `server_url` 表示无 provider 的场景，scheme 与 domain 均为空串。
///
/// # Errors
/// - `timestamp` 为负数时返回 [`StoreError::InvalidTimestamp`]
/// - 非空 `server_url` 不含 `://` 时返回 [`StoreError::MalformedUrl`]
pub fn nonce_key(server_url: &str, timestamp: i64, salt: &str) -> StoreResult<String> {
    if timestamp < 0 {
        return Err(StoreError::InvalidTimestamp(timestamp));
    }

    let parts = if server_url.is_empty() {
        UrlParts {
            scheme: "",
            domain: "",
        }
    } else {
        split_url(server_url)?
    };

    Ok(format!(
        "{:08x}-{}-{}-{}-{}",
        timestamp,
        parts.scheme,
        parts.domain,
        encode(server_url),
        encode(salt)
    ))
}
