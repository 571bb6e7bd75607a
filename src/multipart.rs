//! multipart/form-data 解析：从请求体中取出第一个可接受的文件分段。

use std::fmt;

use crate::path_safety::is_allowed_extension;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const DEFAULT_FILENAME: &str = "file";

/// 借用请求体数据的文件分段。
#[derive(Debug, PartialEq, Eq)]
pub struct FilePart<'a> {
    pub field_name: String,
    pub filename: String,
    pub data: &'a [u8],
}

#[derive(Debug, PartialEq, Eq)]
pub enum MultipartError {
    MissingBoundary,
    NoFilePart,
}

impl fmt::Display for MultipartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MultipartError::MissingBoundary => f.write_str("No boundary"),
            MultipartError::NoFilePart => f.write_str("No file part"),
        }
    }
}

/// 从 `Content-Type` 中提取 `boundary` 参数（支持带引号与不带引号）。
pub fn extract_boundary(content_type: &str) -> Option<String> {
    let start = content_type.find("boundary=")? + "boundary=".len();
    let rest = &content_type[start..];
    let boundary = match rest.strip_prefix('"') {
        Some(quoted) => &quoted[..quoted.find('"')?],
        None => rest
            .split(|ch: char| ch == ';' || ch.is_whitespace())
            .next()
            .unwrap_or_default(),
    };
    let boundary = boundary.trim();
    (!boundary.is_empty()).then(|| boundary.to_string())
}

/// 返回第一个 `Content-Disposition` 带白名单扩展名文件的分段。
///
/// 缺少 `name` 或 `filename` 的分段、扩展名不被允许的分段均跳过；
/// 找到第一个可接受分段即停止扫描。
pub fn first_file_part<'a>(
    body: &'a [u8],
    content_type: &str,
) -> Result<FilePart<'a>, MultipartError> {
    let boundary = extract_boundary(content_type).ok_or(MultipartError::MissingBoundary)?;
    let delimiter = format!("--{boundary}").into_bytes();

    let Some(first) = find(body, &delimiter, 0) else {
        return Err(MultipartError::NoFilePart);
    };
    let mut start = first + delimiter.len();

    while start < body.len() {
        let next = find(body, &delimiter, start);
        let block = match next {
            Some(end) => trim_trailing_crlf(&body[start..end]),
            None => &body[start..],
        };
        start = next.map_or(body.len(), |end| end + delimiter.len());

        let Some(header_end) = find(block, HEADER_TERMINATOR, 0) else {
            continue;
        };
        let headers = String::from_utf8_lossy(&block[..header_end]);
        let Some((field_name, filename)) = parse_disposition(&headers) else {
            continue;
        };
        let filename = if filename.is_empty() {
            DEFAULT_FILENAME.to_string()
        } else {
            filename
        };
        if !is_allowed_extension(&filename) {
            continue;
        }
        return Ok(FilePart {
            field_name,
            filename,
            data: &block[header_end + HEADER_TERMINATOR.len()..],
        });
    }

    Err(MultipartError::NoFilePart)
}

fn parse_disposition(headers: &str) -> Option<(String, String)> {
    let line = headers.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case("content-disposition")
            .then_some(value)
    })?;

    let mut name = None;
    let mut filename = None;
    for (key, value) in disposition_params(line) {
        match key.as_str() {
            "name" => name = Some(value),
            "filename" => filename = Some(value),
            _ => {}
        }
    }

    match (name, filename) {
        (Some(name), Some(filename)) if !name.is_empty() => Some((name, filename)),
        _ => None,
    }
}

/// 解析 `form-data; k=v; k="v"` 形式的参数，引号内的 `;` 与 `=` 属于值本身。
fn disposition_params(value: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let Some(start) = value.find(';') else {
        return params;
    };
    let mut rest = &value[start + 1..];

    loop {
        rest = rest.trim_start_matches(|ch: char| ch == ';' || ch.is_whitespace());
        if rest.is_empty() {
            break;
        }
        let key_end = rest.find(['=', ';']).unwrap_or(rest.len());
        let key = rest[..key_end].trim().to_ascii_lowercase();
        rest = &rest[key_end..];
        let Some(after_eq) = rest.strip_prefix('=') else {
            continue;
        };
        let after_eq = after_eq.trim_start();
        let (param, remainder) = match after_eq.strip_prefix('"') {
            Some(quoted) => match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            },
            None => {
                let end = after_eq.find(';').unwrap_or(after_eq.len());
                (after_eq[..end].trim(), &after_eq[end..])
            }
        };
        params.push((key, param.to_string()));
        rest = remainder;
    }

    params
}

fn trim_trailing_crlf(block: &[u8]) -> &[u8] {
    block.strip_suffix(b"\r\n").unwrap_or(block)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}
