// src/deps/parse.rs

//! Parsers for dependency-listing tool output
//!
//! Each parser returns `None` when the output does not look like what the
//! tool prints, so the caller can warn and move on.

/// Parse `ldd` output. Only `=>` lines name bundleable libraries; the vdso
/// and the dynamic loader are listed without one and are skipped.
///
/// ```text
///     linux-vdso.so.1 (0x00007ffd...)
///     libfoo.so.1 => /opt/lib/libfoo.so.1 (0x00007f...)
///     libbar.so => not found
///     /lib64/ld-linux-x86-64.so.2 (0x00007f...)
/// ```
pub fn parse_ldd(output: &str) -> Option<Vec<String>> {
    let mut names = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.contains("statically linked") || line.contains("not a dynamic executable") {
            continue;
        }

        if let Some((name, location)) = line.split_once("=>") {
            let location = location.trim();
            let resolved = location.split(" (").next().unwrap_or("").trim();
            if resolved.is_empty() || resolved == "not found" {
                names.push(name.trim().to_string());
            } else {
                names.push(resolved.to_string());
            }
        } else if !line.contains(" (") {
            return None;
        }
    }
    Some(names)
}

/// Parse `otool -L` output. The first line names the file being examined.
///
/// ```text
/// /path/to/libgame.dylib:
///     @rpath/libgame.dylib (compatibility version 1.0.0, current version 1.0.0)
///     /usr/lib/libSystem.B.dylib (compatibility version 1.0.0, ...)
/// ```
pub fn parse_otool(output: &str) -> Option<Vec<String>> {
    let mut lines = output.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next()?;
    if !header.trim_end().ends_with(':') {
        return None;
    }

    let mut names = Vec::new();
    for line in lines {
        let (name, _) = line.trim().split_once(" (")?;
        names.push(name.trim().to_string());
    }
    Some(names)
}

/// Parse `dumpbin /dependents` output: the names listed in the block after
/// "Image has the following dependencies:".
pub fn parse_dumpbin(output: &str) -> Option<Vec<String>> {
    let mut lines = output.lines().map(str::trim);
    lines.find(|l| l.starts_with("Image has the following dependencies"))?;

    let mut names = Vec::new();
    for line in lines.skip_while(|l| l.is_empty()) {
        if line.is_empty() {
            break;
        }
        names.push(line.to_string());
    }
    Some(names)
}
