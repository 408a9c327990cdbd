// Map description loaded from JSON.
//
// A `MatchConfig` lists every territory with its index, position, capital
// flag and neighbors. `TerritoryGraph::from_config` (in `graph.rs`) validates
// it and builds the graph; the config itself is plain data.
//
// Example:
//
//     {"territories": [
//         {"index": 0, "x": 0.0, "y": 0.0, "capital": true, "neighbors": [1]},
//         {"index": 1, "x": 40.0, "y": 0.0, "neighbors": [0]}
//     ]}

use serde::{Deserialize, Serialize};

use crate::types::{Position, TerritoryIndex};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    pub territories: Vec<TerritoryConfig>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerritoryConfig {
    pub index: TerritoryIndex,
    pub x: f32,
    pub y: f32,
    /// Major city; players' capitals are chosen from these.
    #[serde(default)]
    pub capital: bool,
    #[serde(default)]
    pub neighbors: Vec<TerritoryIndex>,
}

impl TerritoryConfig {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

impl MatchConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_defaults() {
        let config = MatchConfig::from_json(
            r#"{"territories": [
                {"index": 0, "x": 1.5, "y": 2.0, "capital": true, "neighbors": [1]},
                {"index": 1, "x": 40.0, "y": 0.0}
            ]}"#,
        )
        .unwrap();
        assert_eq!(config.territories.len(), 2);
        assert!(config.territories[0].capital);
        assert_eq!(config.territories[0].position(), Position::new(1.5, 2.0));
        assert!(!config.territories[1].capital);
        assert!(config.territories[1].neighbors.is_empty());
    }
}
