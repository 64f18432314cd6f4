// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Host primitives against a real filesystem, rooted at a prefix so the
//! same code drives `/` on a node and a scratch directory in tests.

use crate::errors::{HostError, HostResult};
use crate::host::{HostOps, OsChange, OsVariant};
use mcd_core::config::SYSTEMD_UNIT_DIR;
use mcd_core::types::{FileEntry, Unit};
use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::Command;

pub const KERNEL_ARGS_FILE: &str = "/etc/kernel/cmdline.d/mcd.conf";
pub const OS_STATE_FILE: &str = "/etc/machine-config-daemon/os.json";
const WANTS_DIR: &str = "multi-user.target.wants";

#[derive(Debug, Clone)]
pub struct LocalHost {
    root: PathBuf,
    /// Run `systemctl` and `systemctl reboot`; off for scratch roots.
    run_commands: bool,
}

impl LocalHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let run_commands = root == Path::new("/");
        Self { root, run_commands }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an absolute host path under the root.
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn unit_path(&self, name: &str) -> PathBuf {
        self.resolve(SYSTEMD_UNIT_DIR).join(name)
    }

    fn wants_path(&self, name: &str) -> PathBuf {
        self.resolve(SYSTEMD_UNIT_DIR).join(WANTS_DIR).join(name)
    }

    fn authorized_keys(&self, user: &str) -> PathBuf {
        self.resolve(&format!("/home/{}/.ssh/authorized_keys.d/mcd", user))
    }

    fn run(&self, program: &str, args: &[&str]) -> HostResult<()> {
        let command = format!("{} {}", program, args.join(" "));
        if !self.run_commands {
            tracing::debug!("Not running `{}` under {}", command, self.root.display());
            return Ok(());
        }
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| HostError::Command { command: command.clone(), detail: e.to_string() })?;
        if !output.status.success() {
            return Err(HostError::Command {
                command,
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Write `data` to `path` via a temp file and rename, creating parents.
fn write_atomic(path: &Path, data: &[u8], mode: u32) -> HostResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| HostError::Rejected(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(parent).map_err(|e| HostError::io(parent.display(), e))?;

    let tmp = path.with_extension("mcdtmp");
    let mut file = fs::File::create(&tmp).map_err(|e| HostError::io(tmp.display(), e))?;
    file.write_all(data).map_err(|e| HostError::io(tmp.display(), e))?;
    file.set_permissions(fs::Permissions::from_mode(mode))
        .map_err(|e| HostError::io(tmp.display(), e))?;
    file.sync_all().map_err(|e| HostError::io(tmp.display(), e))?;
    fs::rename(&tmp, path).map_err(|e| HostError::io(path.display(), e))
}

/// Remove a file or symlink; absent is fine.
fn remove_if_present(path: &Path) -> HostResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HostError::io(path.display(), e)),
    }
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).map(|m| m.file_type().is_symlink()).unwrap_or(false)
}

impl HostOps for LocalHost {
    fn read_file(&self, path: &str) -> HostResult<Option<FileEntry>> {
        let resolved = self.resolve(path);
        let meta = match fs::metadata(&resolved) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(HostError::io(resolved.display(), e)),
        };
        let contents = fs::read_to_string(&resolved).map_err(|e| HostError::io(resolved.display(), e))?;
        Ok(Some(FileEntry {
            path: path.to_string(),
            contents,
            mode: meta.permissions().mode() & 0o7777,
            overwrite: true,
        }))
    }

    fn write_file(&mut self, file: &FileEntry) -> HostResult<()> {
        write_atomic(&self.resolve(&file.path), file.contents.as_bytes(), file.mode)
    }

    fn remove_file(&mut self, path: &str) -> HostResult<()> {
        remove_if_present(&self.resolve(path))
    }

    fn write_unit(&mut self, unit: &Unit) -> HostResult<()> {
        let path = self.unit_path(&unit.name);
        if unit.mask {
            remove_if_present(&path)?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| HostError::io(parent.display(), e))?;
            }
            return symlink("/dev/null", &path).map_err(|e| HostError::io(path.display(), e));
        }

        if is_symlink(&path) {
            // Unmasking.
            remove_if_present(&path)?;
        }
        if let Some(contents) = &unit.contents {
            write_atomic(&path, contents.as_bytes(), 0o644)?;
        }

        let wants = self.wants_path(&unit.name);
        match unit.enabled {
            Some(true) => {
                remove_if_present(&wants)?;
                if let Some(parent) = wants.parent() {
                    fs::create_dir_all(parent).map_err(|e| HostError::io(parent.display(), e))?;
                }
                let target = Path::new(SYSTEMD_UNIT_DIR).join(&unit.name);
                symlink(target, &wants).map_err(|e| HostError::io(wants.display(), e))
            }
            Some(false) => remove_if_present(&wants),
            None => Ok(()),
        }
    }

    fn remove_unit(&mut self, name: &str) -> HostResult<()> {
        remove_if_present(&self.wants_path(name))?;
        remove_if_present(&self.unit_path(name))
    }

    fn set_ssh_keys(&mut self, user: &str, keys: &[String]) -> HostResult<()> {
        let path = self.authorized_keys(user);
        if keys.is_empty() {
            return remove_if_present(&path);
        }
        let mut body = keys.join("\n");
        body.push('\n');
        write_atomic(&path, body.as_bytes(), 0o600)
    }

    fn set_password_hash(&mut self, user: &str, hash: Option<&str>) -> HostResult<()> {
        let path = self.resolve("/etc/shadow");
        let shadow = fs::read_to_string(&path).map_err(|e| HostError::io(path.display(), e))?;
        // An empty field would allow passwordless login; lock instead.
        let hash = hash.unwrap_or("!");

        let mut found = false;
        let mut lines = Vec::new();
        for line in shadow.lines() {
            let mut fields: Vec<&str> = line.split(':').collect();
            if fields.len() > 1 && fields[0] == user {
                found = true;
                fields[1] = hash;
                lines.push(fields.join(":"));
            } else {
                lines.push(line.to_string());
            }
        }
        if !found {
            return Err(HostError::Rejected(format!("user {} not present in /etc/shadow", user)));
        }
        let mut out = lines.join("\n");
        out.push('\n');
        write_atomic(&path, out.as_bytes(), 0o600)
    }

    fn write_kernel_args(&mut self, args: &[String]) -> HostResult<()> {
        let path = self.resolve(KERNEL_ARGS_FILE);
        if args.is_empty() {
            return remove_if_present(&path);
        }
        write_atomic(&path, format!("{}\n", args.join(" ")).as_bytes(), 0o644)
    }

    fn apply_os_image(&mut self, change: &OsChange) -> HostResult<()> {
        if !change.to.image.is_empty() && change.to.image != change.from.image {
            self.run("rpm-ostree", &["rebase", "--experimental", &change.to.image])?;
        }
        let state = serde_json::json!({
            "image": change.to.image,
            "extensions": change.to.extensions,
            "kernelType": change.to.kernel_type,
        });
        let body = serde_json::to_vec_pretty(&state)
            .map_err(|e| HostError::Rejected(format!("encoding OS state: {}", e)))?;
        write_atomic(&self.resolve(OS_STATE_FILE), &body, 0o644)
    }

    fn reload_units(&mut self) -> HostResult<()> {
        self.run("systemctl", &["daemon-reload"])
    }

    fn reboot(&mut self, rationale: &str) -> HostResult<()> {
        tracing::info!("Initiating reboot: {}", rationale);
        self.run("systemctl", &["reboot"])
    }
}

/// Read `etc/os-release` under `root` to find the OS variant.
pub fn detect_os_variant(root: &Path) -> OsVariant {
    let path = root.join("etc/os-release");
    let Ok(text) = fs::read_to_string(&path) else {
        tracing::warn!("Cannot read {}; assuming an unknown OS", path.display());
        return OsVariant::Unknown;
    };
    let mut id = "";
    let mut variant_id = "";
    for line in text.lines() {
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim_matches('"');
            match key {
                "ID" => id = value,
                "VARIANT_ID" => variant_id = value,
                _ => {}
            }
        }
    }
    match (id, variant_id) {
        ("rhcos", _) | ("scos", _) | ("fedora", "coreos") => OsVariant::CoreOs,
        ("rhel", _) | ("centos", _) => OsVariant::Rhel,
        _ => OsVariant::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(path: &str, body: &str) -> FileEntry {
        FileEntry { path: path.into(), contents: body.into(), mode: 0o640, overwrite: true }
    }

    #[test]
    fn test_files_are_written_under_root() {
        let dir = tempdir().unwrap();
        let mut host = LocalHost::new(dir.path());
        host.write_file(&entry("/etc/motd", "hello")).unwrap();

        let path = dir.path().join("etc/motd");
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o640);

        host.remove_file("/etc/motd").unwrap();
        assert!(!path.exists());
        host.remove_file("/etc/motd").unwrap();
    }

    #[test]
    fn test_read_file_reports_contents_and_mode() {
        let dir = tempdir().unwrap();
        let mut host = LocalHost::new(dir.path());
        assert_eq!(host.read_file("/etc/hosts").unwrap(), None);

        host.write_file(&entry("/etc/hosts", "local")).unwrap();
        let read = host.read_file("/etc/hosts").unwrap().unwrap();
        assert_eq!(read.contents, "local");
        assert_eq!(read.mode, 0o640);
        assert_eq!(read.path, "/etc/hosts");
    }

    #[test]
    fn test_unit_mask_and_enable() {
        let dir = tempdir().unwrap();
        let mut host = LocalHost::new(dir.path());
        let unit = Unit {
            name: "kubelet.service".into(),
            contents: Some("[Unit]\n".into()),
            enabled: Some(true),
            mask: false,
        };
        host.write_unit(&unit).unwrap();
        let wants = dir.path().join("etc/systemd/system/multi-user.target.wants/kubelet.service");
        assert!(is_symlink(&wants));

        host.write_unit(&Unit { mask: true, ..unit.clone() }).unwrap();
        let path = dir.path().join("etc/systemd/system/kubelet.service");
        assert_eq!(fs::read_link(&path).unwrap(), PathBuf::from("/dev/null"));

        host.write_unit(&unit).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[Unit]\n");

        host.remove_unit("kubelet.service").unwrap();
        assert!(!path.exists() && !is_symlink(&wants));
    }

    #[test]
    fn test_password_hash_rewrites_shadow() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("etc")).unwrap();
        fs::write(dir.path().join("etc/shadow"), "root:*:19000::::::\ncore:!:19000::::::\n").unwrap();
        let mut host = LocalHost::new(dir.path());

        host.set_password_hash("core", Some("$6$abc")).unwrap();
        let shadow = fs::read_to_string(dir.path().join("etc/shadow")).unwrap();
        assert!(shadow.contains("core:$6$abc:19000"));
        assert!(shadow.starts_with("root:*:"));

        host.set_password_hash("core", None).unwrap();
        assert!(fs::read_to_string(dir.path().join("etc/shadow")).unwrap().contains("core:!:"));
        assert!(matches!(host.set_password_hash("nobody", None), Err(HostError::Rejected(_))));
    }

    #[test]
    fn test_ssh_keys_and_kernel_args() {
        let dir = tempdir().unwrap();
        let mut host = LocalHost::new(dir.path());
        host.set_ssh_keys("core", &["ssh-ed25519 AAA".into()]).unwrap();
        let keys = dir.path().join("home/core/.ssh/authorized_keys.d/mcd");
        assert_eq!(fs::read_to_string(&keys).unwrap(), "ssh-ed25519 AAA\n");
        host.set_ssh_keys("core", &[]).unwrap();
        assert!(!keys.exists());

        host.write_kernel_args(&["nosmt".into(), "quiet".into()]).unwrap();
        assert_eq!(fs::read_to_string(host.resolve(KERNEL_ARGS_FILE)).unwrap(), "nosmt quiet\n");
    }

    #[test]
    fn test_detect_os_variant() {
        let dir = tempdir().unwrap();
        assert_eq!(detect_os_variant(dir.path()), OsVariant::Unknown);
        fs::create_dir_all(dir.path().join("etc")).unwrap();
        fs::write(dir.path().join("etc/os-release"), "NAME=\"RHCOS\"\nID=\"rhcos\"\n").unwrap();
        assert_eq!(detect_os_variant(dir.path()), OsVariant::CoreOs);
        fs::write(dir.path().join("etc/os-release"), "ID=\"rhel\"\nVERSION_ID=\"9.4\"\n").unwrap();
        assert_eq!(detect_os_variant(dir.path()), OsVariant::Rhel);
    }
}
