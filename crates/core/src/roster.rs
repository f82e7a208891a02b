//! Process table parsing and parent/child classification.
//!
//! Rows are re-fetched on every poll and never cached beyond one decision
//! cycle. Package filtering is a case-sensitive substring match over the raw
//! row text; a package name that is a prefix of another will match both
//! (known looseness, kept).

use agdb_bridge::DeviceBridge;

use crate::{Error, Result};

/// Single-letter process state code from the device's `ps` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
	Running,
	Sleeping,
	Stopped,
	UninterruptibleWait,
	Zombie,
	Unknown(char),
}

impl ProcState {
	pub fn from_code(code: char) -> Self {
		match code {
			'R' => Self::Running,
			'S' => Self::Sleeping,
			'T' => Self::Stopped,
			'D' => Self::UninterruptibleWait,
			'Z' => Self::Zombie,
			other => Self::Unknown(other),
		}
	}

	/// Interruptible-wait states: quiescent enough to attach to.
	pub fn is_waiting(self) -> bool {
		matches!(self, Self::Sleeping | Self::Stopped)
	}
}

/// One structurally parsed `ps` row.
#[derive(Debug, Clone)]
pub struct ProcessRow {
	pub pid: u32,
	pub state: ProcState,
	pub command: String,
	/// Full row text, kept for substring-based package/marker matching.
	pub raw: String,
}

impl ProcessRow {
	/// Parses one `ps` row: pid is the first numeric token, state the first
	/// known single-letter code, command the final token. Rows without a pid
	/// (e.g. the header) parse to `None`.
	pub fn parse(raw: &str) -> Option<Self> {
		let fields: Vec<&str> = raw.split_whitespace().collect();
		let pid = fields.iter().find_map(|f| f.parse::<u32>().ok())?;
		let state = fields
			.iter()
			.filter(|f| f.len() == 1)
			.filter_map(|f| f.chars().next())
			.find(|c| matches!(c, 'R' | 'S' | 'T' | 'D' | 'Z'))
			.map(ProcState::from_code)
			.unwrap_or(ProcState::Unknown('?'));
		let command = fields.last()?.to_string();
		Some(Self { pid, state, command, raw: raw.to_string() })
	}
}

/// Parent/children classification of a package's rows.
#[derive(Debug, Clone, Default)]
pub struct RoleSet {
	pub parent: Option<u32>,
	pub children: Vec<u32>,
}

/// Parses a full `ps` dump, dropping the header and malformed rows.
pub fn parse_table(out: &str) -> Vec<ProcessRow> {
	out.lines().filter_map(ProcessRow::parse).collect()
}

/// One device round-trip for the current process table.
pub async fn fetch_table(bridge: &dyn DeviceBridge) -> Result<Vec<ProcessRow>> {
	let out = bridge.call(&["shell", "ps"]).await?;
	Ok(parse_table(&out))
}

/// Rows whose raw text contains the package substring.
pub fn filter_package(table: &[ProcessRow], package: &str) -> Vec<ProcessRow> {
	table.iter().filter(|row| row.raw.contains(package)).cloned().collect()
}

/// Rows in an interruptible-wait state.
pub fn waiting_rows(rows: &[ProcessRow]) -> Vec<ProcessRow> {
	rows.iter().filter(|row| row.state.is_waiting()).cloned().collect()
}

/// Splits rows into parent and children: a row is a child iff its text
/// contains `child_marker`. More than one parent candidate is a
/// distinguished error rather than a silent first-match.
pub fn classify(rows: &[ProcessRow], child_marker: &str) -> Result<RoleSet> {
	let mut roles = RoleSet::default();
	let mut parents = Vec::new();
	for row in rows {
		if row.raw.contains(child_marker) {
			roles.children.push(row.pid);
		} else {
			parents.push(row.pid);
		}
	}
	match parents.len() {
		0 => {}
		1 => roles.parent = Some(parents[0]),
		_ => return Err(Error::AmbiguousParent { pids: parents }),
	}
	Ok(roles)
}
