//! Image reference expansion.

/// Replace `$(VAR)` references using `lookup`.
///
/// `$$` yields a literal `$`. References that `lookup` cannot resolve, and
/// unterminated `$(`, are kept verbatim.
pub fn expand(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
        } else if let Some(body) = after.strip_prefix('(') {
            match body.find(')') {
                Some(end) => {
                    let var = &body[..end];
                    match lookup(var) {
                        Some(value) => out.push_str(&value),
                        None => {
                            out.push_str("$(");
                            out.push_str(var);
                            out.push(')');
                        }
                    }
                    rest = &body[end + 1..];
                }
                None => {
                    out.push_str(&rest[pos..]);
                    rest = "";
                }
            }
        } else {
            out.push('$');
            rest = after;
        }
    }
    out.push_str(rest);
    out
}

/// Point an image reference at `registry`, replacing any registry host it names
pub fn replace_image_registry(image: &str, registry: Option<&str>) -> String {
    let Some(registry) = registry.map(|r| r.trim_end_matches('/')).filter(|r| !r.is_empty()) else {
        return image.to_string();
    };
    let repository = match image.split_once('/') {
        Some((host, rest)) if host.contains('.') || host.contains(':') || host == "localhost" => rest,
        _ => image,
    };
    format!("{registry}/{repository}")
}
