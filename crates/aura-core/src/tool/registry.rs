//! Tool registry: persistent store of user-registered external API tools

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use super::descriptor::{CustomToolDefinition, ExternalApiSpec, ToolDescriptor};
use crate::{Error, Result};

/// Read side of the tool registry, as seen by the catalog
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    async fn list_all(&self) -> Result<Vec<ToolDescriptor>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<ToolDescriptor>>;
}

/// SQLite-backed registry
///
/// Owns name uniqueness: registrations that collide with a reserved
/// (compiled-in) name or an existing tool are rejected here, so the catalog
/// never has to arbitrate at lookup time.
pub struct SqliteToolRegistry {
    conn: Mutex<Connection>,
    reserved: HashSet<String>,
}

impl SqliteToolRegistry {
    /// Open (or create) the registry at `db_path`
    pub fn new(db_path: &str) -> Result<Self> {
        debug!("Opening tool registry at: {}", db_path);
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::with_connection(Connection::open(db_path)?)
    }

    /// Create an in-memory registry (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let registry = Self {
            conn: Mutex::new(conn),
            reserved: HashSet::new(),
        };
        registry.init_tables()?;
        Ok(registry)
    }

    /// Names no custom tool may take
    pub fn with_reserved_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved.extend(names.into_iter().map(Into::into));
        self
    }

    fn init_tables(&self) -> Result<()> {
        self.conn()?.execute(
            "CREATE TABLE IF NOT EXISTS tools (
                name TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                spec TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Persistence("tool registry lock poisoned".to_string()))
    }

    fn validate(&self, definition: &CustomToolDefinition) -> Result<()> {
        let name_pattern = Regex::new(r"^[A-Za-z0-9_-]{1,64}$")
            .map_err(|e| Error::Other(e.to_string()))?;
        if !name_pattern.is_match(&definition.name) {
            return Err(Error::InvalidToolConfig(format!(
                "tool name '{}' must be 1-64 characters of letters, digits, '_' or '-'",
                definition.name
            )));
        }
        if definition.description.trim().is_empty() {
            return Err(Error::InvalidToolConfig(format!(
                "tool '{}' needs a description",
                definition.name
            )));
        }

        // Placeholders are filled at call time; check the rest parses
        let placeholder = Regex::new(r"\{[^{}]*\}").map_err(|e| Error::Other(e.to_string()))?;
        let probe = placeholder.replace_all(&definition.spec.url_template, "x");
        url::Url::parse(&probe).map_err(|e| {
            Error::InvalidToolConfig(format!(
                "invalid url template '{}': {}",
                definition.spec.url_template, e
            ))
        })?;

        if !definition.spec.parameter_schema.is_object() {
            return Err(Error::InvalidToolConfig(
                "parameter_schema must be a JSON object".to_string(),
            ));
        }
        Ok(())
    }

    /// Register a new custom tool
    pub fn register(&self, definition: CustomToolDefinition) -> Result<ToolDescriptor> {
        self.validate(&definition)?;
        if self.reserved.contains(&definition.name) {
            return Err(Error::InvalidToolConfig(format!(
                "'{}' is reserved for a built-in agent",
                definition.name
            )));
        }

        let now = Utc::now().to_rfc3339();
        let spec_json = serde_json::to_string(&definition.spec)?;
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO tools (name, description, spec, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![definition.name, definition.description, spec_json, now],
        )?;
        if inserted == 0 {
            return Err(Error::InvalidToolConfig(format!(
                "a tool named '{}' already exists",
                definition.name
            )));
        }

        info!("Registered custom tool: {}", definition.name);
        Ok(definition.into_descriptor())
    }

    /// Replace description and invocation spec of an existing tool
    pub fn update(&self, definition: CustomToolDefinition) -> Result<ToolDescriptor> {
        self.validate(&definition)?;

        let spec_json = serde_json::to_string(&definition.spec)?;
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE tools SET description = ?2, spec = ?3, updated_at = ?4 WHERE name = ?1",
            params![
                definition.name,
                definition.description,
                spec_json,
                Utc::now().to_rfc3339()
            ],
        )?;
        if updated == 0 {
            return Err(Error::ToolNotFound(definition.name));
        }

        info!("Updated custom tool: {}", definition.name);
        Ok(definition.into_descriptor())
    }

    /// Remove a tool; returns whether it existed
    pub fn remove(&self, name: &str) -> Result<bool> {
        let affected = self
            .conn()?
            .execute("DELETE FROM tools WHERE name = ?1", params![name])?;
        if affected > 0 {
            info!("Removed custom tool: {}", name);
        }
        Ok(affected > 0)
    }

    fn row_to_descriptor(name: String, description: String, spec_json: &str) -> Result<ToolDescriptor> {
        let spec: ExternalApiSpec = serde_json::from_str(spec_json)
            .map_err(|e| Error::Persistence(format!("corrupt spec for tool '{}': {}", name, e)))?;
        Ok(ToolDescriptor::external_api(name, description, spec))
    }
}

#[async_trait]
impl ToolRegistry for SqliteToolRegistry {
    async fn list_all(&self) -> Result<Vec<ToolDescriptor>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name, description, spec FROM tools ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut tools = Vec::new();
        for row in rows {
            let (name, description, spec) = row?;
            tools.push(Self::row_to_descriptor(name, description, &spec)?);
        }
        Ok(tools)
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<ToolDescriptor>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT name, description, spec FROM tools WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(name, description, spec)| Self::row_to_descriptor(name, description, &spec))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{AuthSpec, InvocationSpec};
    use serde_json::json;

    fn stock_tool(name: &str) -> CustomToolDefinition {
        serde_json::from_value(json!({
            "name": name,
            "description": "Stock prices",
            "url_template": "https://x/stocks/{symbol}",
            "auth": {"type": "bearer", "value": "tok"},
            "system_prompt": "Extract the ticker symbol",
            "parameter_schema": {
                "type": "object",
                "properties": {"symbol": {"type": "string"}, "range": {"type": "string"}},
                "required": ["symbol"]
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = SqliteToolRegistry::in_memory().unwrap();
        registry.register(stock_tool("finance_api")).unwrap();

        let tool = registry.get_by_name("finance_api").await.unwrap().unwrap();
        assert_eq!(tool.description, "Stock prices");
        match tool.invocation {
            InvocationSpec::ExternalApi(spec) => {
                assert_eq!(spec.url_template, "https://x/stocks/{symbol}");
                assert_eq!(spec.auth, AuthSpec::Bearer { value: "tok".into() });
            }
            other => panic!("unexpected invocation: {other:?}"),
        }

        assert!(registry.get_by_name("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_all_sorted_by_name() {
        let registry = SqliteToolRegistry::in_memory().unwrap();
        registry.register(stock_tool("weather_api")).unwrap();
        registry.register(stock_tool("finance_api")).unwrap();

        let names: Vec<_> = registry
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["finance_api", "weather_api"]);
    }

    #[test]
    fn test_reserved_and_duplicate_names_rejected() {
        let registry = SqliteToolRegistry::in_memory()
            .unwrap()
            .with_reserved_names(["ask_industrial_agent"]);

        let reserved = registry.register(stock_tool("ask_industrial_agent"));
        assert!(matches!(reserved, Err(Error::InvalidToolConfig(_))));

        registry.register(stock_tool("finance_api")).unwrap();
        let duplicate = registry.register(stock_tool("finance_api"));
        assert!(matches!(duplicate, Err(Error::InvalidToolConfig(_))));
    }

    #[test]
    fn test_invalid_definitions_rejected() {
        let registry = SqliteToolRegistry::in_memory().unwrap();

        let mut bad_name = stock_tool("has spaces");
        assert!(registry.register(bad_name.clone()).is_err());

        bad_name.name = "ok_name".into();
        bad_name.spec.url_template = "not a url/{x}".into();
        assert!(registry.register(bad_name).is_err());
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let registry = SqliteToolRegistry::in_memory().unwrap();
        registry.register(stock_tool("finance_api")).unwrap();

        let mut changed = stock_tool("finance_api");
        changed.description = "Quotes and history".into();
        registry.update(changed).unwrap();
        let tool = registry.get_by_name("finance_api").await.unwrap().unwrap();
        assert_eq!(tool.description, "Quotes and history");

        assert!(registry.remove("finance_api").unwrap());
        assert!(!registry.remove("finance_api").unwrap());
        assert!(matches!(
            registry.update(stock_tool("finance_api")),
            Err(Error::ToolNotFound(_))
        ));
    }
}
