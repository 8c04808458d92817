use crate::{Error, Result};

pub(crate) const UNIT_PATH_PREFIX: &str = "/org/freedesktop/systemd1/unit/";

pub(crate) fn canonicalize_unit_name(input: &str) -> Result<String> {
    validate_no_control("unit", input)?;
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::invalid_input("unit must not be empty"));
    }
    // `\` is legal: systemd escapes bytes in unit names as `\xNN`.
    if input.contains('/') {
        return Err(Error::invalid_input("unit must not contain '/'"));
    }
    if input.contains("..") {
        return Err(Error::invalid_input("unit must not contain '..'"));
    }

    if input.contains('.') {
        return Ok(input.to_string());
    }
    Ok(format!("{input}.service"))
}

pub(crate) fn validate_no_control(context: &'static str, input: &str) -> Result<()> {
    if input.contains('\0') {
        return Err(Error::invalid_input(format!(
            "{context} must not contain NUL"
        )));
    }
    if input.contains('\n') || input.contains('\r') {
        return Err(Error::invalid_input(format!(
            "{context} must not contain newlines"
        )));
    }
    if input.chars().any(|c| c.is_control()) {
        return Err(Error::invalid_input(format!(
            "{context} must not contain control characters"
        )));
    }
    Ok(())
}

/// Escape one object-path element the way systemd does (`bus_label_escape`).
///
/// Every byte outside `[A-Za-z0-9]` becomes `_xx`, as does a leading digit. The empty string maps
/// to `_`.
pub(crate) fn escape_path_label(label: &str) -> String {
    if label.is_empty() {
        return "_".to_string();
    }
    let mut out = String::with_capacity(label.len());
    for (i, b) in label.bytes().enumerate() {
        if b.is_ascii_alphabetic() || (b.is_ascii_digit() && i > 0) {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("_{b:02x}"));
        }
    }
    out
}

/// Inverse of `escape_path_label`. Returns `None` for malformed escapes or non-UTF-8 output.
pub(crate) fn unescape_path_label(label: &str) -> Option<String> {
    if label == "_" {
        return Some(String::new());
    }
    let bytes = label.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'_' {
            let hex = label.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Recover a unit name from its object path (`/org/freedesktop/systemd1/unit/<label>`).
pub(crate) fn unit_name_from_path(path: &str) -> Option<String> {
    let label = path.strip_prefix(UNIT_PATH_PREFIX)?;
    if label.is_empty() || label.contains('/') {
        return None;
    }
    unescape_path_label(label)
}
