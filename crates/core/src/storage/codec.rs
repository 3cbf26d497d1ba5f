use crate::domain::Document;
use anyhow::Context;

/// Pretty-printed UTF-8 JSON with a trailing newline. CJK names are written as-is.
pub fn serialize(document: &Document) -> anyhow::Result<Vec<u8>> {
    let mut out =
        serde_json::to_vec_pretty(document).context("failed to serialize document JSON")?;
    out.push(b'\n');
    Ok(out)
}

/// Strict decoding: the bytes must be a complete, invariant-respecting document.
pub fn deserialize(bytes: &[u8]) -> anyhow::Result<Document> {
    let document = serde_json::from_slice::<Document>(bytes)
        .context("bytes are not a valid document JSON")?;
    document.validate()?;
    Ok(document)
}
