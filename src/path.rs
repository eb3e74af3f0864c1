// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路径解析模块
//!
//! 把请求行中的原始目标字符串映射为根目录下的绝对路径。
//!
//! ## 解析步骤
//! 1. 把每一段连续的 `/..`（可带结尾斜杠）折叠为单个 `/`。
//! 2. 去掉开头的一个 `/`。
//! 3. 百分号解码。线上形式 `t%C3%A9st` 与磁盘上的 `tést` 不同，必须先解码再访问文件系统。
//! 4. 拼接到根目录，并规范化为不含 `.`、`..` 的绝对路径。
//!
//! 解码后仍残留的 `..`（例如来自 `%2e%2e`）会在根目录处被截断，
//! 因此结果永远不会跳出根目录。符号链接不在防御范围内。

use std::{
    fs, io,
    path::{Component, Path, PathBuf},
};

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::exception::Exception;

lazy_static! {
    static ref PARENT_RUN: Regex = Regex::new(r"(/\.{2,})+/?").unwrap();
}

/// 将原始请求目标解析为根目录下的路径。
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// `root` 应当已经是规范化的绝对路径（见 `Config::normalize`）。
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, target: &str, id: u128) -> PathBuf {
        let collapsed = PARENT_RUN.replace_all(target, "/");
        let relative = collapsed.strip_prefix('/').unwrap_or(&*collapsed);
        let decoded = urlencoding::decode_binary(relative.as_bytes());
        let decoded = String::from_utf8_lossy(&decoded);

        let joined = self.root.join(clamp_to_root(Path::new(&*decoded)));
        let resolved = match fs::canonicalize(&joined) {
            Ok(p) => p,
            // 不存在的路径无法 canonicalize，此时 joined 本身已不含 `.` 与 `..`
            Err(_) => joined,
        };
        debug!("[ID{}]路径解析：{} -> {}", id, target, resolved.display());
        resolved
    }
}

/// 逐段规范化相对路径，`..` 最多退回到起点，不会越过它。
fn clamp_to_root(relative: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    normalized
}

/// 检查路径是否可读。
///
/// 用 `access(2)` 只检查权限，不打开目标，因此 FIFO、设备文件也不会阻塞调用方。
/// 只有权限错误返回 [`Exception::PermissionDenied`]，
/// 不存在或其他错误都交给后续的存在性检查处理。
#[cfg(unix)]
pub fn check_readable(path: &Path) -> Result<(), Exception> {
    use std::{ffi::CString, os::unix::ffi::OsStrExt};

    // 含 NUL 的路径不可能存在
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return Ok(());
    };
    let ret = unsafe { libc::access(c_path.as_ptr(), libc::R_OK) };
    if ret == 0 {
        return Ok(());
    }
    match io::Error::last_os_error().kind() {
        io::ErrorKind::PermissionDenied => Err(Exception::PermissionDenied),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
pub fn check_readable(path: &Path) -> Result<(), Exception> {
    match fs::metadata(path) {
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Err(Exception::PermissionDenied),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs::File;

    fn resolver() -> (tempfile::TempDir, PathResolver) {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        (dir, PathResolver::new(root))
    }

    #[test]
    fn test_plain_target() {
        let (_dir, resolver) = resolver();
        assert_eq!(resolver.resolve("/a/b.txt", 0), resolver.root().join("a/b.txt"));
        assert_eq!(resolver.resolve("/", 0), resolver.root());
    }

    #[test]
    fn test_parent_runs_collapse() {
        let (_dir, resolver) = resolver();
        let root = resolver.root().to_path_buf();
        assert_eq!(resolver.resolve("/../../etc/passwd", 0), root.join("etc/passwd"));
        assert_eq!(resolver.resolve("/a/../../b", 0), root.join("a/b"));
        assert_eq!(resolver.resolve("/..", 0), root);
        assert_eq!(resolver.resolve("/..././x", 0), root.join("x"));
    }

    #[test]
    fn test_encoded_traversal_is_clamped() {
        let (_dir, resolver) = resolver();
        let root = resolver.root().to_path_buf();
        assert_eq!(resolver.resolve("/%2e%2e/%2e%2e/etc", 0), root.join("etc"));
        assert_eq!(resolver.resolve("..", 0), root);
        assert_eq!(resolver.resolve("/..%2f..%2fetc", 0), root.join("etc"));
    }

    #[test]
    fn test_percent_decoding_matches_disk_name() {
        let (_dir, resolver) = resolver();
        let on_disk = resolver.root().join("t\u{e9}st");
        File::create(&on_disk).unwrap();

        let resolved = resolver.resolve("/t%C3%A9st", 0);
        assert_eq!(resolved, fs::canonicalize(&on_disk).unwrap());
        assert!(resolved.exists());
    }

    #[test]
    fn test_existing_directory_is_canonical() {
        let (_dir, resolver) = resolver();
        fs::create_dir(resolver.root().join("sub")).unwrap();
        assert_eq!(resolver.resolve("/sub/./", 0), resolver.root().join("sub"));
    }

    #[test]
    fn test_readable_file_passes() {
        let (_dir, resolver) = resolver();
        let path = resolver.root().join("ok.txt");
        File::create(&path).unwrap();
        assert!(check_readable(&path).is_ok());
        assert!(check_readable(&resolver.root().join("missing")).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_is_forbidden() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, resolver) = resolver();
        let path = resolver.root().join("secret.txt");
        File::create(&path).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();

        // root 用户无视权限位，此时无法构造不可读文件
        if File::open(&path).is_ok() {
            return;
        }
        assert_eq!(check_readable(&path), Err(Exception::PermissionDenied));
    }

    #[cfg(unix)]
    #[test]
    fn test_fifo_check_does_not_block() {
        use std::{ffi::CString, os::unix::ffi::OsStrExt};

        let (_dir, resolver) = resolver();
        let fifo = resolver.root().join("pipe");
        let c_path = CString::new(fifo.as_os_str().as_bytes()).unwrap();
        assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o644) }, 0);

        // 打开 FIFO 读端会一直等到有写者出现，这里必须立即返回
        assert!(check_readable(&fifo).is_ok());
    }

    proptest! {
        #[test]
        fn prop_never_escapes_root(
            segments in prop::collection::vec(
                prop_oneof![
                    Just("..".to_string()),
                    Just("...".to_string()),
                    Just("%2e%2e".to_string()),
                    Just(".".to_string()),
                    Just("".to_string()),
                    "[a-z]{1,6}",
                ],
                0..12,
            ),
            leading_slash in any::<bool>(),
        ) {
            let (_dir, resolver) = resolver();
            let mut target = segments.join("/");
            if leading_slash {
                target.insert(0, '/');
            }
            let resolved = resolver.resolve(&target, 0);
            prop_assert!(resolved.starts_with(resolver.root()), "{} -> {}", target, resolved.display());
        }
    }
}
