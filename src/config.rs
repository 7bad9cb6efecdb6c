use anyhow::Context;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub max_connections: u32,
}

impl Settings {
    /// Reads settings from the process environment, after loading `.env` if present.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;
        let max_connections = parse_max_connections(
            std::env::var("STUDENT_RESULTS_MAX_CONNECTIONS").ok().as_deref(),
        )?;

        Ok(Self {
            database_url,
            max_connections,
        })
    }
}

fn parse_max_connections(value: Option<&str>) -> anyhow::Result<u32> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(DEFAULT_MAX_CONNECTIONS),
        Some(raw) => {
            let parsed: u32 = raw
                .parse()
                .with_context(|| format!("invalid STUDENT_RESULTS_MAX_CONNECTIONS: {raw}"))?;
            anyhow::ensure!(parsed > 0, "STUDENT_RESULTS_MAX_CONNECTIONS must be positive");
            Ok(parsed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_defaults_and_validates() {
        assert_eq!(parse_max_connections(None).unwrap(), 5);
        assert_eq!(parse_max_connections(Some("  ")).unwrap(), 5);
        assert_eq!(parse_max_connections(Some("12")).unwrap(), 12);
        assert!(parse_max_connections(Some("0")).is_err());
        assert!(parse_max_connections(Some("many")).is_err());
    }
}
