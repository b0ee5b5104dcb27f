// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Leading-verb classification used to decide which statements replicate.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
	Insert,
	Update,
	Delete,
	Select,
	Other,
}

impl StatementKind {
	/// Classifies `sql` by its first keyword, skipping whitespace, `--` line
	/// comments and `/* */` block comments. Matching is case-insensitive.
	pub fn classify(sql: &str) -> Self {
		let keyword = leading_keyword(sql);
		if keyword.eq_ignore_ascii_case("insert") {
			StatementKind::Insert
		} else if keyword.eq_ignore_ascii_case("update") {
			StatementKind::Update
		} else if keyword.eq_ignore_ascii_case("delete") {
			StatementKind::Delete
		} else if keyword.eq_ignore_ascii_case("select") {
			StatementKind::Select
		} else {
			StatementKind::Other
		}
	}

	/// Statements that are queued for replication.
	pub fn is_mutation(self) -> bool {
		matches!(
			self,
			StatementKind::Insert | StatementKind::Update | StatementKind::Delete
		)
	}
}

fn leading_keyword(sql: &str) -> &str {
	let mut rest = sql;
	loop {
		rest = rest.trim_start();
		if let Some(after) = rest.strip_prefix("--") {
			rest = after.find('\n').map(|i| &after[i + 1..]).unwrap_or("");
		} else if let Some(after) = rest.strip_prefix("/*") {
			rest = after.find("*/").map(|i| &after[i + 2..]).unwrap_or("");
		} else {
			break;
		}
	}

	let end = rest
		.find(|c: char| !c.is_ascii_alphabetic())
		.unwrap_or(rest.len());
	&rest[..end]
}
