//! JSON Lines import and export
//!
//! One document per line, the way `mongoexport` writes a collection.
//! A bad line is logged and counted, never fatal.

use rultor_common::db::{Document, DocumentStore, Predicate};
use rultor_common::Result;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub rejected: usize,
}

/// Insert every document read from `reader`
pub async fn import_jsonl<R>(store: &dyn DocumentStore, reader: R) -> Result<ImportReport>
where
    R: AsyncBufRead + Unpin,
{
    let mut report = ImportReport::default();
    let mut lines = reader.lines();
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let doc = match serde_json::from_str(line)
            .map_err(rultor_common::Error::from)
            .and_then(Document::from_json)
        {
            Ok(doc) => doc,
            Err(e) => {
                warn!("line {}: rejected: {}", line_no, e);
                report.rejected += 1;
                continue;
            }
        };

        store.insert(doc).await?;
        report.imported += 1;
    }

    info!(
        "Imported {} document(s), rejected {}",
        report.imported, report.rejected
    );
    Ok(report)
}

/// Write every document to `writer`, returning how many were written
pub async fn export_jsonl<W>(store: &dyn DocumentStore, mut writer: W) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let docs = store.find(&Predicate::Any).await?;
    for doc in &docs {
        let mut line = serde_json::to_string(&doc.to_json())?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
    }
    writer.flush().await?;

    info!("Exported {} document(s)", docs.len());
    Ok(docs.len())
}
