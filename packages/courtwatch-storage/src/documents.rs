use sqlx::PgExecutor;

use crate::{
	Result,
	models::{IndexedDocumentRow, ParentDocumentRow},
};

/// Last write wins for a given document id.
pub async fn upsert_indexed_document<'e, E>(executor: E, row: &IndexedDocumentRow) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO indexed_documents (document_id, document_type, parent_id, fields, searchable_text, updated_at)
VALUES ($1,$2,$3,$4,$5,$6)
ON CONFLICT (document_id) DO UPDATE
SET document_type = EXCLUDED.document_type,
\tparent_id = EXCLUDED.parent_id,
\tfields = EXCLUDED.fields,
\tsearchable_text = EXCLUDED.searchable_text,
\tupdated_at = EXCLUDED.updated_at",
	)
	.bind(row.document_id)
	.bind(&row.document_type)
	.bind(row.parent_id)
	.bind(&row.fields)
	.bind(&row.searchable_text)
	.bind(row.updated_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_indexed_document<'e, E>(
	executor: E,
	document_id: i64,
) -> Result<Option<IndexedDocumentRow>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, IndexedDocumentRow>(
		"\
SELECT document_id, document_type, parent_id, fields, searchable_text, updated_at
FROM indexed_documents
WHERE document_id = $1",
	)
	.bind(document_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

pub async fn list_child_documents<'e, E>(
	executor: E,
	parent_id: i64,
) -> Result<Vec<IndexedDocumentRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, IndexedDocumentRow>(
		"\
SELECT document_id, document_type, parent_id, fields, searchable_text, updated_at
FROM indexed_documents
WHERE parent_id = $1
ORDER BY document_id ASC",
	)
	.bind(parent_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn upsert_parent_document<'e, E>(executor: E, row: &ParentDocumentRow) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO parent_documents (parent_id, document_type, fields, updated_at)
VALUES ($1,$2,$3,$4)
ON CONFLICT (parent_id) DO UPDATE
SET document_type = EXCLUDED.document_type,
\tfields = EXCLUDED.fields,
\tupdated_at = EXCLUDED.updated_at",
	)
	.bind(row.parent_id)
	.bind(&row.document_type)
	.bind(&row.fields)
	.bind(row.updated_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_parent_document<'e, E>(
	executor: E,
	parent_id: i64,
) -> Result<Option<ParentDocumentRow>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, ParentDocumentRow>(
		"SELECT parent_id, document_type, fields, updated_at FROM parent_documents WHERE parent_id = $1",
	)
	.bind(parent_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}
