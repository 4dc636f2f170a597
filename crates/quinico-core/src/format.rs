use std::fmt;

/// Output shape selected by the `format` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    /// No `format` given: the full HTML page with graphs and links.
    #[default]
    Page,
    Db,
    Db1,
    Db2,
    Json,
    Json1,
    Json2,
    Csv,
    Graph,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Page => "",
            Self::Db => "db",
            Self::Db1 => "db1",
            Self::Db2 => "db2",
            Self::Json => "json",
            Self::Json1 => "json1",
            Self::Json2 => "json2",
            Self::Csv => "csv",
            Self::Graph => "graph",
        }
    }

    pub fn is_page(self) -> bool {
        self == Self::Page
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "" => Ok(Self::Page),
            "db" => Ok(Self::Db),
            "db1" => Ok(Self::Db1),
            "db2" => Ok(Self::Db2),
            "json" => Ok(Self::Json),
            "json1" => Ok(Self::Json1),
            "json2" => Ok(Self::Json2),
            "csv" => Ok(Self::Csv),
            "graph" => Ok(Self::Graph),
            other => Err(format!("Improperly formatted format:{other}")),
        }
    }
}
