//! Mount table the new environment boots with.
//!
//! These entries use legacy ZFS mounts so systemd, not the zfs mount
//! service, owns their ordering. Each carries an `x-systemd.before=` hint
//! forcing the mount ahead of the unit that would otherwise race it.

use crate::context::RunContext;

/// Home directories of the appliance's administrative users.
pub const HOME_TARGET: &str = "/export/home";
/// The appliance data area. Empty at provisioning; populated at activation.
pub const DATA_TARGET: &str = "/var/delphix";
/// Persistent system logs.
pub const LOG_TARGET: &str = "/var/log";
/// Crash dump area, shared with the pool-level dump dataset.
pub const CRASH_TARGET: &str = "/var/crash";

/// Leaf volume names paired with their mount targets, in mount-table order.
pub const LEAF_MOUNTS: [(&str, &str); 3] = [
    ("home", HOME_TARGET),
    ("data", DATA_TARGET),
    ("log", LOG_TARGET),
];

/// Ordering hint keeping these mounts ahead of pool import.
const IMPORT_ORDERING: &str = "x-systemd.before=zfs-import-cache.service";
/// Extra hint for the crash area, which kdump reads during early boot.
const KDUMP_ORDERING: &str = "x-systemd.before=kdump-tools.service";

/// One line of the mount table.
#[derive(Debug, Clone)]
pub struct MountTableEntry {
    pub source: String,
    pub target: String,
    pub fstype: String,
    pub options: String,
    pub dump: u32,
    pub pass: u32,
}

impl MountTableEntry {
    fn render(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.source, self.target, self.fstype, self.options, self.dump, self.pass
        )
    }
}

/// The four entries a migration instance boots with: its own home, data,
/// and log volumes plus the pool-level crash dump dataset.
pub fn migration_entries(ctx: &RunContext) -> Vec<MountTableEntry> {
    let mut entries: Vec<MountTableEntry> = LEAF_MOUNTS
        .iter()
        .map(|(leaf, target)| MountTableEntry {
            source: ctx.dataset(leaf),
            target: target.to_string(),
            fstype: "zfs".to_string(),
            options: format!("defaults,{}", IMPORT_ORDERING),
            dump: 0,
            pass: 0,
        })
        .collect();

    entries.push(MountTableEntry {
        source: ctx.crashdump_dataset(),
        target: CRASH_TARGET.to_string(),
        fstype: "zfs".to_string(),
        options: format!("defaults,{},{}", IMPORT_ORDERING, KDUMP_ORDERING),
        dump: 0,
        pass: 0,
    });

    entries
}

/// Render a complete fstab, one entry per line.
pub fn render(entries: &[MountTableEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.render());
        out.push('\n');
    }
    out
}
