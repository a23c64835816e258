pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_stored_queries.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_stored_queries.sql")),
				"tables/002_percolator_queries.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_percolator_queries.sql")),
				"tables/003_parent_documents.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_parent_documents.sql")),
				"tables/004_indexed_documents.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_indexed_documents.sql")),
				"tables/005_novelty_sets.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_novelty_sets.sql")),
				"tables/006_novelty_guards.sql" =>
					out.push_str(include_str!("../../../sql/tables/006_novelty_guards.sql")),
				"tables/007_alert_outbox.sql" =>
					out.push_str(include_str!("../../../sql/tables/007_alert_outbox.sql")),
				"tables/008_digest_runs.sql" =>
					out.push_str(include_str!("../../../sql/tables/008_digest_runs.sql")),
				other => out.push_str(&format!("-- unknown include: {other}\n")),
			}

			out.push('\n');

			continue;
		}

		out.push_str(line);
		out.push('\n');
	}

	out
}
