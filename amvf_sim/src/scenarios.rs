//! Vertex finding scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// S1: no tracks at all
    EmptyInput,

    /// S2: one track with single-track vertices allowed
    SingleTrack,

    /// S3: two well separated vertices
    TwoClusters,

    /// S4: two vertices closer than the resolution
    Overlapping,

    /// S5: every candidate is too contaminated to keep
    Contaminated,

    /// S6: seed at the origin while the constraint sits elsewhere
    SeedAtOrigin,

    /// S7: the seeder runs out before the tracks do
    SeederExhausted,

    // ═══════════════════════════════════════════════════
    // EVENT-LEVEL SCENARIOS
    // ═══════════════════════════════════════════════════
    /// Many vertices spread along the beam spot
    Pileup,

    /// Two vertices found with the grid density seeder
    GridSeeding,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::EmptyInput,
            ScenarioId::SingleTrack,
            ScenarioId::TwoClusters,
            ScenarioId::Overlapping,
            ScenarioId::Contaminated,
            ScenarioId::SeedAtOrigin,
            ScenarioId::SeederExhausted,
            ScenarioId::Pileup,
            ScenarioId::GridSeeding,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::EmptyInput => "empty_input",
            ScenarioId::SingleTrack => "single_track",
            ScenarioId::TwoClusters => "two_clusters",
            ScenarioId::Overlapping => "overlapping",
            ScenarioId::Contaminated => "contaminated",
            ScenarioId::SeedAtOrigin => "seed_at_origin",
            ScenarioId::SeederExhausted => "seeder_exhausted",
            ScenarioId::Pileup => "pileup",
            ScenarioId::GridSeeding => "grid_seeding",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::EmptyInput => "Empty track list must fail with EmptyInput",
            ScenarioId::SingleTrack => "One track at z=50 with a constrained single-track vertex",
            ScenarioId::TwoClusters => "Clusters at z=0 and z=30, expect two vertices",
            ScenarioId::Overlapping => "Clusters 0.05 mm apart, expect one merged vertex",
            ScenarioId::Contaminated => {
                "Fixed weight 0.5 for every track, expect all candidates rejected"
            }
            ScenarioId::SeedAtOrigin => "Seed at z=0 with constraint at z=-1 is a real seed",
            ScenarioId::SeederExhausted => {
                "Seeder knows only z=10, expect one vertex and no-more-seeds"
            }
            ScenarioId::Pileup => "20 vertices from the beam spot, efficiency and fake rate",
            ScenarioId::GridSeeding => "Two clusters with the grid density seeder",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "empty_input" | "empty" | "s1" => Ok(ScenarioId::EmptyInput),
            "single_track" | "single" | "s2" => Ok(ScenarioId::SingleTrack),
            "two_clusters" | "two" | "s3" => Ok(ScenarioId::TwoClusters),
            "overlapping" | "overlap" | "s4" => Ok(ScenarioId::Overlapping),
            "contaminated" | "s5" => Ok(ScenarioId::Contaminated),
            "seed_at_origin" | "origin" | "s6" => Ok(ScenarioId::SeedAtOrigin),
            "seeder_exhausted" | "exhausted" | "s7" => Ok(ScenarioId::SeederExhausted),
            "pileup" => Ok(ScenarioId::Pileup),
            "grid_seeding" | "grid" => Ok(ScenarioId::GridSeeding),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
