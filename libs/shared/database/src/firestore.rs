use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use tracing::{debug, error};

use shared_config::AppConfig;

/// Firestore REST client. Documents are addressed as
/// `projects/{project}/databases/(default)/documents/{collection}/{id}`.
pub struct FirestoreClient {
    client: Client,
    base_url: String,
    project_id: String,
    api_key: String,
}

/// A fetched document with the server-assigned update time, which doubles as
/// the write precondition token.
#[derive(Debug, Clone)]
pub struct FirestoreDocument {
    pub fields: Value,
    pub update_time: String,
}

/// Outcome of a conditional patch.
#[derive(Debug)]
pub enum PatchOutcome {
    Applied(FirestoreDocument),
    PreconditionFailed,
}

impl FirestoreClient {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: config.firestore_base_url.clone(),
            project_id: config.firestore_project_id.clone(),
            api_key: config.firestore_api_key.clone(),
        }
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents",
            self.base_url, self.project_id
        )
    }

    pub async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<FirestoreDocument>> {
        let url = format!(
            "{}/{}/{}?key={}",
            self.documents_url(),
            collection,
            id,
            self.api_key
        );
        debug!("Fetching Firestore document {}/{}", collection, id);

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("Firestore error ({}): {}", status, error_text);
            return Err(anyhow!("Firestore error ({}): {}", status, error_text));
        }

        let doc: Value = response.json().await?;
        Ok(Some(parse_document(&doc)?))
    }

    pub async fn create_document(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<FirestoreDocument> {
        let url = format!(
            "{}/{}?documentId={}&key={}",
            self.documents_url(),
            collection,
            id,
            self.api_key
        );
        debug!("Creating Firestore document {}/{}", collection, id);

        let body = json!({ "fields": encode_fields(&fields)? });
        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("Firestore error ({}): {}", status, error_text);
            return Err(anyhow!("Firestore error ({}): {}", status, error_text));
        }

        let doc: Value = response.json().await?;
        parse_document(&doc)
    }

    /// Patch a document, conditioned on its last observed update time. A stale
    /// token yields `PatchOutcome::PreconditionFailed` instead of an error.
    pub async fn patch_document(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
        field_paths: &[&str],
        precondition_update_time: &str,
    ) -> Result<PatchOutcome> {
        let mut url = format!(
            "{}/{}/{}?key={}&currentDocument.updateTime={}",
            self.documents_url(),
            collection,
            id,
            self.api_key,
            urlencoding::encode(precondition_update_time)
        );
        for path in field_paths {
            url.push_str(&format!("&updateMask.fieldPaths={}", path));
        }
        debug!("Patching Firestore document {}/{}", collection, id);

        let body = json!({ "fields": encode_fields(&fields)? });
        let response = self.client.patch(&url).json(&body).send().await?;

        let status = response.status();
        if status == StatusCode::CONFLICT || status.as_u16() == 412 {
            return Ok(PatchOutcome::PreconditionFailed);
        }
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("Firestore error ({}): {}", status, error_text);
            return Err(anyhow!("Firestore error ({}): {}", status, error_text));
        }

        let doc: Value = response.json().await?;
        Ok(PatchOutcome::Applied(parse_document(&doc)?))
    }

    /// Run a structured query against a collection and return the decoded
    /// field maps of the matching documents.
    pub async fn run_query(&self, structured_query: Value) -> Result<Vec<FirestoreDocument>> {
        let url = format!("{}:runQuery?key={}", self.documents_url(), self.api_key);
        debug!("Running Firestore structured query");

        let body = json!({ "structuredQuery": structured_query });
        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("Firestore error ({}): {}", status, error_text);
            return Err(anyhow!("Firestore error ({}): {}", status, error_text));
        }

        let rows: Vec<Value> = response.json().await?;
        let mut documents = Vec::new();
        for row in rows {
            if let Some(doc) = row.get("document") {
                documents.push(parse_document(doc)?);
            }
        }
        Ok(documents)
    }
}

fn parse_document(doc: &Value) -> Result<FirestoreDocument> {
    let fields = doc.get("fields").cloned().unwrap_or_else(|| json!({}));
    let update_time = doc
        .get("updateTime")
        .and_then(|t| t.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(FirestoreDocument {
        fields: decode_fields(&fields)?,
        update_time,
    })
}

/// Encode a plain JSON object into Firestore's typed `fields` map.
pub fn encode_fields(value: &Value) -> Result<Value> {
    let obj = value
        .as_object()
        .ok_or_else(|| anyhow!("Firestore document body must be a JSON object"))?;

    let mut fields = Map::new();
    for (key, val) in obj {
        fields.insert(key.clone(), encode_value(val));
    }
    Ok(Value::Object(fields))
}

fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => {
            let mut fields = Map::new();
            for (key, val) in map {
                fields.insert(key.clone(), encode_value(val));
            }
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

/// Decode Firestore's typed `fields` map back into plain JSON.
pub fn decode_fields(fields: &Value) -> Result<Value> {
    let obj = fields
        .as_object()
        .ok_or_else(|| anyhow!("Firestore fields must be a JSON object"))?;

    let mut out = Map::new();
    for (key, val) in obj {
        out.insert(key.clone(), decode_value(val)?);
    }
    Ok(Value::Object(out))
}

fn decode_value(value: &Value) -> Result<Value> {
    let obj = value
        .as_object()
        .ok_or_else(|| anyhow!("Firestore value must be a JSON object"))?;

    if let Some((kind, inner)) = obj.iter().next() {
        let decoded = match kind.as_str() {
            "nullValue" => Value::Null,
            "booleanValue" => inner.clone(),
            "integerValue" => {
                let n = inner
                    .as_str()
                    .and_then(|s| s.parse::<i64>().ok())
                    .or_else(|| inner.as_i64())
                    .ok_or_else(|| anyhow!("Malformed integerValue: {}", inner))?;
                json!(n)
            }
            "doubleValue" => inner.clone(),
            "stringValue" | "timestampValue" | "referenceValue" => inner.clone(),
            "arrayValue" => {
                let items = inner
                    .get("values")
                    .and_then(|v| v.as_array())
                    .cloned()
                    .unwrap_or_default();
                let decoded: Result<Vec<Value>> = items.iter().map(decode_value).collect();
                Value::Array(decoded?)
            }
            "mapValue" => {
                let fields = inner.get("fields").cloned().unwrap_or_else(|| json!({}));
                decode_fields(&fields)?
            }
            other => return Err(anyhow!("Unsupported Firestore value kind: {}", other)),
        };
        Ok(decoded)
    } else {
        Ok(Value::Null)
    }
}
