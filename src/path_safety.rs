//! 文件名清洗、扩展名白名单与路径参数解码。

/// 视为图片的扩展名（小写比较）。
pub const ALLOWED_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "bmp"];

/// 将 `[A-Za-z0-9._-]` 之外的字符替换为 `_`。
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

/// 将文件名拆分为主名与扩展名（不含点）。
///
/// 开头的点不算扩展名分隔符，`.png` 没有扩展名。
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) if index > 0 => (&name[..index], &name[index + 1..]),
        _ => (name, ""),
    }
}

/// 扩展名（不区分大小写）是否在白名单内。
pub fn is_allowed_extension(name: &str) -> bool {
    let (_, ext) = split_extension(name);
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str())
}

/// URL 解码路径参数并移除所有 `..`。
///
/// 结果仍是相对输入，调用方需逐段拼接到上传根目录下并拒绝符号链接。
pub fn decode_relative_path(raw: &str) -> String {
    let decoded = urlencoding::decode_binary(raw.as_bytes());
    String::from_utf8_lossy(&decoded).replace("..", "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_disallowed_characters() {
        assert_eq!(sanitize_filename("my photo (1).png"), "my_photo__1_.png");
        assert_eq!(sanitize_filename("a b#c/d.jpg"), "a_b_c_d.jpg");
        assert_eq!(sanitize_filename("plain_name-2.webp"), "plain_name-2.webp");
        assert_eq!(sanitize_filename(""), "");
    }

    #[test]
    fn extension_gate_is_case_insensitive() {
        for name in ["a.png", "a.JPG", "a.Jpeg", "a.gif", "a.webp", "a.SVG", "a.ico", "a.bmp"] {
            assert!(is_allowed_extension(name), "{name} should be allowed");
        }
        for name in ["a.exe", "a.png.exe", "png", ".png", "a.", "a.tiff"] {
            assert!(!is_allowed_extension(name), "{name} should be rejected");
        }
    }

    #[test]
    fn split_extension_uses_last_dot() {
        assert_eq!(split_extension("archive.tar.png"), ("archive.tar", "png"));
        assert_eq!(split_extension("logo.PNG"), ("logo", "PNG"));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
        assert_eq!(split_extension("noext"), ("noext", ""));
    }

    #[test]
    fn decode_strips_traversal_sequences() {
        assert_eq!(decode_relative_path("03%2Flogo.PNG"), "03/logo.PNG");
        assert_eq!(decode_relative_path("..%2F..%2Fetc%2Fpasswd"), "//etc/passwd");
        assert_eq!(decode_relative_path("../../etc/passwd"), "//etc/passwd");
        assert_eq!(decode_relative_path("...."), "");
        assert_eq!(decode_relative_path("a%20b.png"), "a b.png");
    }
}
