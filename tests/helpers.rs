//! Shared test utilities: a sandboxed appliance for the migration to run
//! against.
//!
//! The sandbox puts stateful stand-ins for zfs, mount, umount, and hostid
//! first on PATH. The zfs ledger (datasets, properties, mounts) lives in
//! plain files under a state directory, so tests can seed a running system
//! and assert on the exact volume state a run leaves behind. tar is the
//! real tool; payloads are real tarballs built from a staged tree.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

use sha2::{Digest, Sha256};
use tempfile::TempDir;

use dlpx_migration::config::Config;

/// Dataset the sandbox reports as mounted at `/`.
pub const RUNNING_ROOT_DATASET: &str = "domain0/ROOT/delphix.illumos";
/// Pool the sandbox hosts.
pub const POOL: &str = "domain0";
/// Host id the fake hostid tool reports.
pub const FAKE_HOSTID: &str = "8a2f9d01";

static ARCHIVE_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Test environment with a fake pool, boot directory, and tmp root.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Fake tool directory, placed first on PATH.
    pub bin_dir: PathBuf,
    /// Fake zfs state ledger.
    pub state_dir: PathBuf,
    /// Sandboxed boot directory.
    pub boot_dir: PathBuf,
    /// Sandboxed tmp root for working directories.
    pub tmp_dir: PathBuf,
    /// Where fabricated upgrade archives land.
    pub archives_dir: PathBuf,
}

impl TestEnv {
    /// Create a sandbox seeded with a healthy running system at 5.3.6.5.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let env = Self {
            bin_dir: base.join("bin"),
            state_dir: base.join("state"),
            boot_dir: base.join("boot"),
            tmp_dir: base.join("tmp"),
            archives_dir: base.join("archives"),
            _temp_dir: temp_dir,
        };
        for dir in [
            &env.bin_dir,
            &env.state_dir,
            &env.boot_dir,
            &env.tmp_dir,
            &env.archives_dir,
        ] {
            fs::create_dir_all(dir).expect("Failed to create sandbox dir");
        }

        env.install_fake_tools();
        env.seed_pool_state();
        env
    }

    fn install_fake_tools(&self) {
        write_script(&self.bin_dir.join("zfs"), FAKE_ZFS);
        write_script(&self.bin_dir.join("mount"), FAKE_MOUNT);
        write_script(&self.bin_dir.join("umount"), FAKE_UMOUNT);
        write_script(
            &self.bin_dir.join("hostid"),
            &format!("#!/bin/bash\necho {}\n", FAKE_HOSTID),
        );
    }

    fn seed_pool_state(&self) {
        fs::write(
            self.state_dir.join("datasets"),
            format!("{0}\n{0}/ROOT\n{1}\n{0}/crashdump\n", POOL, RUNNING_ROOT_DATASET),
        )
        .expect("Failed to seed datasets");
        fs::write(
            self.state_dir.join("rootds"),
            format!("{}\n", RUNNING_ROOT_DATASET),
        )
        .expect("Failed to seed root dataset");
        fs::write(
            self.state_dir.join("props"),
            format!(
                "{}|com.delphix:current-version|5.3.6.5\n",
                RUNNING_ROOT_DATASET
            ),
        )
        .expect("Failed to seed props");
        fs::write(self.state_dir.join("mounts"), "").expect("Failed to seed mounts");
    }

    /// Override the version property of the running system's root dataset.
    pub fn set_running_version(&self, version: &str) {
        let mut props = fs::read_to_string(self.state_dir.join("props"))
            .expect("Failed to read props");
        props.push_str(&format!(
            "{}|com.delphix:current-version|{}\n",
            RUNNING_ROOT_DATASET, version
        ));
        fs::write(self.state_dir.join("props"), props).expect("Failed to write props");
    }

    /// Strip the version property entirely.
    pub fn clear_running_version(&self) {
        let props = fs::read_to_string(self.state_dir.join("props"))
            .expect("Failed to read props");
        let kept: String = props
            .lines()
            .filter(|line| !line.contains("|com.delphix:current-version|"))
            .map(|line| format!("{}\n", line))
            .collect();
        fs::write(self.state_dir.join("props"), kept).expect("Failed to write props");
    }

    /// PATH with the fake tools first and the real system after (tar is
    /// resolved from the real system).
    pub fn path_env(&self) -> String {
        format!(
            "{}:{}",
            self.bin_dir.display(),
            std::env::var("PATH").unwrap_or_default()
        )
    }

    /// The provisioner binary, wired to this sandbox.
    pub fn migrate_command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_dlpx-migration"));
        self.apply_sandbox(&mut cmd);
        cmd
    }

    /// The hold utility binary, wired to this sandbox.
    pub fn hold_command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_dlpx-migration-hold"));
        self.apply_sandbox(&mut cmd);
        cmd
    }

    fn apply_sandbox(&self, cmd: &mut Command) {
        cmd.env("PATH", self.path_env())
            .env("MIGRATION_FAKE_STATE", &self.state_dir)
            .env("MIGRATION_BOOT_DIR", &self.boot_dir)
            .env("MIGRATION_TMP_DIR", &self.tmp_dir)
            .current_dir(self._temp_dir.path());
    }

    /// Sandbox this process's environment; restores on drop. Tests calling
    /// this must hold the `serial` lock, since the environment is global.
    pub fn activate(&self) -> EnvGuard {
        EnvGuard::set(vec![
            ("PATH".to_string(), self.path_env()),
            (
                "MIGRATION_FAKE_STATE".to_string(),
                self.state_dir.to_string_lossy().into_owned(),
            ),
            (
                "MIGRATION_BOOT_DIR".to_string(),
                self.boot_dir.to_string_lossy().into_owned(),
            ),
            (
                "MIGRATION_TMP_DIR".to_string(),
                self.tmp_dir.to_string_lossy().into_owned(),
            ),
        ])
    }

    /// Config pointing at the sandbox paths.
    pub fn config(&self) -> Config {
        Config {
            boot_dir: self.boot_dir.clone(),
            tmp_dir: self.tmp_dir.clone(),
        }
    }

    pub fn boot_menu_path(&self) -> PathBuf {
        self.boot_dir.join("menu.rc.local")
    }

    // ---- fake pool state, as the ledger files see it ----

    pub fn datasets(&self) -> Vec<String> {
        read_lines(&self.state_dir.join("datasets"))
    }

    pub fn dataset_exists(&self, name: &str) -> bool {
        self.datasets().iter().any(|d| d == name)
    }

    /// Last-set value of a property, like the fake zfs reports it.
    pub fn prop(&self, dataset: &str, property: &str) -> Option<String> {
        let prefix = format!("{}|{}|", dataset, property);
        read_lines(&self.state_dir.join("props"))
            .iter()
            .rev()
            .find_map(|line| line.strip_prefix(&prefix).map(str::to_string))
    }

    /// Currently mounted (dataset, path) pairs.
    pub fn mounts(&self) -> Vec<(String, String)> {
        read_lines(&self.state_dir.join("mounts"))
            .iter()
            .filter_map(|line| {
                line.split_once('|')
                    .map(|(d, p)| (d.to_string(), p.to_string()))
            })
            .collect()
    }

    /// The instance datasets currently present under the container.
    pub fn instances(&self) -> Vec<String> {
        let prefix = format!("{}/os-root/delphix.", POOL);
        self.datasets()
            .into_iter()
            .filter(|d| d.starts_with(&prefix) && !d[prefix.len()..].contains('/'))
            .collect()
    }

    /// Every tool invocation the fakes saw, in order.
    pub fn tool_log(&self) -> Vec<String> {
        read_lines(&self.state_dir.join("zfs.log"))
    }

    // ---- upgrade archive fabrication ----

    /// Fabricate a valid archive: descriptor, payload tarball, boot images.
    pub fn make_archive(&self, version: &str, min_version: &str) -> PathBuf {
        self.make_archive_with_payload(version, min_version, &[])
    }

    /// Fabricate an archive whose payload carries extra files.
    pub fn make_archive_with_payload(
        &self,
        version: &str,
        min_version: &str,
        extra_files: &[(&str, &str)],
    ) -> PathBuf {
        let seq = ARCHIVE_SEQ.fetch_add(1, Ordering::SeqCst);
        let dir = self.archives_dir.join(format!("upgrade-{}", seq));
        let stage = self.archives_dir.join(format!("stage-{}", seq));

        fs::create_dir_all(dir.join("boot")).expect("Failed to create archive dirs");
        fs::write(
            dir.join("version.info"),
            format!("DLPX_VERSION={}\nDLPX_MIN_VERSION={}\n", version, min_version),
        )
        .expect("Failed to write version.info");
        fs::write(dir.join("boot/vmlinuz-9.0"), format!("kernel {}", version))
            .expect("Failed to write kernel image");
        fs::write(dir.join("boot/initrd.img-9.0"), format!("initrd {}", version))
            .expect("Failed to write initrd image");

        let mut files: Vec<(&str, &str)> = vec![
            ("etc/issue", "Delphix Linux\n"),
            ("etc/hostname", "delphix\n"),
            ("usr/bin/migrate-smoke", "#!/bin/sh\nexit 0\n"),
        ];
        files.extend_from_slice(extra_files);
        for (rel, content) in files {
            let path = stage.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("Failed to create payload dir");
            }
            fs::write(&path, content).expect("Failed to write payload file");
        }

        let status = Command::new("tar")
            .args(["-czf"])
            .arg(dir.join("rootfs.tar.gz"))
            .arg("-C")
            .arg(&stage)
            .arg(".")
            .status()
            .expect("Failed to run tar");
        assert!(status.success(), "tar failed to build the payload");

        dir
    }

    /// Drop an extra image into an archive's boot directory.
    pub fn add_boot_image(&self, archive: &Path, name: &str) {
        fs::write(archive.join("boot").join(name), format!("image {}", name))
            .expect("Failed to write extra boot image");
    }

    /// Write a SHA256SUMS manifest covering the payload tarball.
    pub fn add_checksums(&self, archive: &Path) {
        let digest = sha256_hex(&archive.join("rootfs.tar.gz"));
        fs::write(
            archive.join("SHA256SUMS"),
            format!("{}  rootfs.tar.gz\n", digest),
        )
        .expect("Failed to write SHA256SUMS");
    }
}

/// Scoped environment override; restores the previous values on drop.
pub struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    pub fn set(vars: Vec<(String, String)>) -> Self {
        let saved = vars
            .iter()
            .map(|(key, _)| (key.clone(), std::env::var(key).ok()))
            .collect();
        for (key, value) in &vars {
            std::env::set_var(key, value);
        }
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

/// SHA-256 of a file as lowercase hex.
pub fn sha256_hex(path: &Path) -> String {
    let bytes = fs::read(path).expect("Failed to read file for hashing");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    format!("{:x}", hasher.finalize())
}

/// Assert that a file contains expected content.
pub fn assert_file_contains(path: &Path, expected: &str) {
    let content =
        fs::read_to_string(path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
    assert!(
        content.contains(expected),
        "File {} does not contain expected content.\nExpected to find: {}\nActual content: {}",
        path.display(),
        expected,
        content
    );
}

/// Assert that a file exists.
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "Expected file to exist: {}", path.display());
}

fn read_lines(path: &Path) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(content) => content.lines().map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}

fn write_script(path: &Path, content: &str) {
    fs::write(path, content).expect("Failed to write fake tool");
    let mut perms = fs::metadata(path)
        .expect("Failed to get metadata")
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("Failed to set permissions");
}

/// Stateful stand-in for zfs(8). The ledger lives in plain files so tests
/// can seed and inspect it; commands fail the way the real tool does when
/// handed a dataset that does not exist.
const FAKE_ZFS: &str = r##"#!/bin/bash
set -u
STATE="${MIGRATION_FAKE_STATE:?MIGRATION_FAKE_STATE is not set}"
DATASETS="$STATE/datasets"
PROPS="$STATE/props"
MOUNTS="$STATE/mounts"
touch "$DATASETS" "$PROPS" "$MOUNTS"
echo "zfs $*" >> "$STATE/zfs.log"

die() {
    echo "zfs: $*" >&2
    exit 1
}

has_dataset() {
    grep -Fqx "$1" "$DATASETS"
}

cmd="${1:-}"
shift || true

case "$cmd" in
    create)
        props=""
        while [ "${1:-}" = "-o" ]; do
            props="$props${props:+ }$2"
            shift 2
        done
        name="${1:?create: missing dataset name}"
        case "$name" in
            */*)
                parent="${name%/*}"
                has_dataset "$parent" || die "cannot create '$name': parent does not exist"
                ;;
        esac
        has_dataset "$name" && die "cannot create '$name': dataset already exists"
        echo "$name" >> "$DATASETS"
        for kv in $props; do
            echo "$name|${kv%%=*}|${kv#*=}" >> "$PROPS"
        done
        ;;
    destroy)
        recursive=0
        while true; do
            case "${1:-}" in
                -r) recursive=1; shift ;;
                -f) shift ;;
                *) break ;;
            esac
        done
        name="${1:?destroy: missing dataset name}"
        has_dataset "$name" || die "cannot open '$name': dataset does not exist"
        if [ "$recursive" = 1 ]; then
            awk -v n="$name" '$0 != n && index($0, n "/") != 1' "$DATASETS" > "$DATASETS.tmp" && mv "$DATASETS.tmp" "$DATASETS"
            awk -F'|' -v n="$name" '$1 != n && index($1, n "/") != 1' "$PROPS" > "$PROPS.tmp" && mv "$PROPS.tmp" "$PROPS"
            awk -F'|' -v n="$name" '$1 != n && index($1, n "/") != 1' "$MOUNTS" > "$MOUNTS.tmp" && mv "$MOUNTS.tmp" "$MOUNTS"
        else
            if awk -v n="$name" 'index($0, n "/") == 1 { found = 1 } END { exit !found }' "$DATASETS"; then
                die "cannot destroy '$name': filesystem has children"
            fi
            awk -v n="$name" '$0 != n' "$DATASETS" > "$DATASETS.tmp" && mv "$DATASETS.tmp" "$DATASETS"
            awk -F'|' -v n="$name" '$1 != n' "$PROPS" > "$PROPS.tmp" && mv "$PROPS.tmp" "$PROPS"
            awk -F'|' -v n="$name" '$1 != n' "$MOUNTS" > "$MOUNTS.tmp" && mv "$MOUNTS.tmp" "$MOUNTS"
        fi
        ;;
    list)
        target=""
        while [ $# -gt 0 ]; do
            case "$1" in
                -H|-r) ;;
                -o) shift ;;
                *) target="$1" ;;
            esac
            shift
        done
        if [ "$target" = "/" ]; then
            cat "$STATE/rootds"
        elif [ -z "$target" ]; then
            cat "$DATASETS"
        elif has_dataset "$target"; then
            echo "$target"
        else
            die "cannot open '$target': dataset does not exist"
        fi
        ;;
    get)
        prop=""
        name=""
        while [ $# -gt 0 ]; do
            case "$1" in
                -H) ;;
                -o) shift ;;
                *)
                    if [ -z "$prop" ]; then prop="$1"; else name="$1"; fi
                    ;;
            esac
            shift
        done
        [ -n "$name" ] || die "get: missing dataset name"
        has_dataset "$name" || die "cannot open '$name': dataset does not exist"
        value="$(awk -F'|' -v n="$name" -v p="$prop" '$1 == n && $2 == p { v = $3 } END { print v }' "$PROPS")"
        if [ -n "$value" ]; then
            echo "$value"
        else
            echo "-"
        fi
        ;;
    set)
        kv="${1:?set: missing property=value}"
        name="${2:?set: missing dataset name}"
        has_dataset "$name" || die "cannot open '$name': dataset does not exist"
        p="${kv%%=*}"
        awk -F'|' -v n="$name" -v p="$p" '!($1 == n && $2 == p)' "$PROPS" > "$PROPS.tmp" && mv "$PROPS.tmp" "$PROPS"
        echo "$name|$p|${kv#*=}" >> "$PROPS"
        ;;
    inherit)
        p="${1:?inherit: missing property}"
        name="${2:?inherit: missing dataset name}"
        has_dataset "$name" || die "cannot open '$name': dataset does not exist"
        awk -F'|' -v n="$name" -v p="$p" '!($1 == n && $2 == p)' "$PROPS" > "$PROPS.tmp" && mv "$PROPS.tmp" "$PROPS"
        ;;
    mount)
        name="${1:?mount: missing dataset name}"
        has_dataset "$name" || die "cannot open '$name': dataset does not exist"
        mp="$(awk -F'|' -v n="$name" '$1 == n && $2 == "mountpoint" { v = $3 } END { print v }' "$PROPS")"
        case "$mp" in
            /*) ;;
            *) die "cannot mount '$name': no usable mountpoint" ;;
        esac
        mkdir -p "$mp"
        echo "$name|$mp" >> "$MOUNTS"
        ;;
    umount)
        arg="${1:?umount: missing argument}"
        if ! awk -F'|' -v a="$arg" '$1 == a || $2 == a { found = 1 } END { exit !found }' "$MOUNTS"; then
            die "cannot unmount '$arg': not currently mounted"
        fi
        awk -F'|' -v a="$arg" '$1 != a && $2 != a' "$MOUNTS" > "$MOUNTS.tmp" && mv "$MOUNTS.tmp" "$MOUNTS"
        ;;
    *)
        die "unrecognized command '$cmd'"
        ;;
esac
exit 0
"##;

/// Stand-in for mount(8); accepts only the legacy zfs form the code uses.
const FAKE_MOUNT: &str = r##"#!/bin/bash
set -u
STATE="${MIGRATION_FAKE_STATE:?MIGRATION_FAKE_STATE is not set}"
echo "mount $*" >> "$STATE/zfs.log"
if [ "${1:-}" != "-F" ] || [ "${2:-}" != "zfs" ]; then
    echo "mount: only -F zfs is supported" >&2
    exit 1
fi
dataset="${3:?mount: missing dataset}"
dir="${4:?mount: missing mount point}"
grep -Fqx "$dataset" "$STATE/datasets" || { echo "mount: cannot open '$dataset'" >&2; exit 1; }
[ -d "$dir" ] || { echo "mount: mount point $dir does not exist" >&2; exit 1; }
echo "$dataset|$dir" >> "$STATE/mounts"
"##;

/// Stand-in for umount(8).
const FAKE_UMOUNT: &str = r##"#!/bin/bash
set -u
STATE="${MIGRATION_FAKE_STATE:?MIGRATION_FAKE_STATE is not set}"
echo "umount $*" >> "$STATE/zfs.log"
arg="${1:?umount: missing target}"
if ! awk -F'|' -v a="$arg" '$1 == a || $2 == a { found = 1 } END { exit !found }' "$STATE/mounts"; then
    echo "umount: $arg: not mounted" >&2
    exit 1
fi
awk -F'|' -v a="$arg" '$1 != a && $2 != a' "$STATE/mounts" > "$STATE/mounts.tmp" && mv "$STATE/mounts.tmp" "$STATE/mounts"
"##;
