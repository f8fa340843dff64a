//! The loader's local menu configuration, edited as a slot-keyed line table.
//!
//! `menu.rc.local` is a flat, line-oriented Forth fragment the loader
//! sources after its stock menu. The migration owns exactly one menu slot
//! plus one slotless command-line variable, five `set` lines in total. All
//! edits go through this model so a re-run removes exactly what a prior run
//! added and nothing else.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Menu slot owned by the migration entry. The stock menu uses lower slots.
pub const MENU_SLOT: u32 = 8;
/// Loader key code selecting the migration entry ('m').
pub const MENU_KEYCODE: u32 = 109;
/// Slotless variable carrying the kernel argument string.
pub const CMDLINE_VAR: &str = "linux_cmdline";
/// Slot-indexed variables that make up one menu entry.
pub const SLOT_VARS: [&str; 4] = [
    "mainmenu_caption",
    "mainansi_caption",
    "mainmenu_keycode",
    "mainmenu_command",
];

/// One loader menu entry, rendered into five `set` lines.
#[derive(Debug, Clone)]
pub struct BootMenuEntry {
    /// Kernel argument string, stored slotless so the command can expand it.
    pub cmdline: String,
    /// Plain caption shown on dumb consoles.
    pub caption: String,
    /// Caption with ANSI emphasis on the hotkey letter.
    pub ansi_caption: String,
    /// Key code that activates the entry.
    pub keycode: u32,
    /// Forth command the loader evaluates when the entry is chosen.
    pub command: String,
}

impl BootMenuEntry {
    /// Render the five `set` lines for `slot`, in file order.
    pub fn render(&self, slot: u32) -> Vec<String> {
        vec![
            format!("set {}=\"{}\"", CMDLINE_VAR, self.cmdline),
            format!("set {}[{}]=\"{}\"", SLOT_VARS[0], slot, self.caption),
            format!("set {}[{}]=\"{}\"", SLOT_VARS[1], slot, self.ansi_caption),
            format!("set {}[{}]=\"{}\"", SLOT_VARS[2], slot, self.keycode),
            format!("set {}[{}]=\"{}\"", SLOT_VARS[3], slot, self.command),
        ]
    }
}

/// Line prefixes identifying everything the migration owns at `slot`.
pub fn owned_prefixes(slot: u32) -> Vec<String> {
    let mut prefixes = vec![format!("set {}=", CMDLINE_VAR)];
    prefixes.extend(
        SLOT_VARS
            .iter()
            .map(|var| format!("set {}[{}]=", var, slot)),
    );
    prefixes
}

/// In-memory copy of the local menu file.
///
/// Lines are kept verbatim; ownership is decided purely by prefix, so
/// comments, stock entries, and variables in other slots pass through
/// untouched.
#[derive(Debug, Default)]
pub struct MenuConfig {
    lines: Vec<String>,
}

impl MenuConfig {
    /// Load the menu file. A missing file is an empty menu.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        Ok(Self {
            lines: content.lines().map(str::to_string).collect(),
        })
    }

    /// Write the menu file back out.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut content = self.lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        fs::write(path, content).with_context(|| format!("cannot write {}", path.display()))
    }

    /// Remove every line owned by `slot`. Returns how many were dropped.
    pub fn remove_slot(&mut self, slot: u32) -> usize {
        let prefixes = owned_prefixes(slot);
        let before = self.lines.len();
        self.lines
            .retain(|line| !prefixes.iter().any(|p| line.trim_start().starts_with(p)));
        before - self.lines.len()
    }

    /// Count the lines owned by `slot`.
    pub fn owned_lines(&self, slot: u32) -> usize {
        let prefixes = owned_prefixes(slot);
        self.lines
            .iter()
            .filter(|line| prefixes.iter().any(|p| line.trim_start().starts_with(p)))
            .count()
    }

    /// Append a rendered entry for `slot` at the end of the file.
    pub fn append(&mut self, entry: &BootMenuEntry, slot: u32) {
        self.lines.extend(entry.render(slot));
    }

    /// The current lines, verbatim.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}
