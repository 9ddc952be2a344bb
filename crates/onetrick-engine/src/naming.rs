use rand::Rng;

/// Supplies display names for newly created snapshots.
pub trait SnapshotNamer: Send + Sync {
    fn name(&self) -> String;
}

const BUILD_TYPES: &[&str] = &[
    "Aggressive", "Defensive", "Rush", "Anchor", "Precision", "Flanking", "Support", "Slayer",
    "Lockdown", "Roaming", "Shutdown", "Denial", "Counter", "Zone", "Reactive", "Passive",
    "Punish", "Pressure", "Control", "Tempo",
];

const PLAYSTYLES: &[&str] = &[
    "Silent", "Swift", "Methodical", "Calculated", "Ruthless", "Tactical", "Coordinated",
    "Disciplined", "Unpredictable", "Patient", "Aggressive", "Precise", "Rapid", "Strategic",
    "Dominant", "Disruptive", "Elusive", "Mobile", "Defensive", "Persistent",
];

const MEME_TERMS: &[&str] = &[
    "Main Character", "Touch Grass", "Crayon Eater", "Monkey Brain", "W Key", "Skill Issue",
    "Tilt Proof", "Keyboard Warrior", "Chair Camper", "Sweat Lord", "Tryhard Andy", "No Life",
    "Dad Build", "Bot Lobby", "Grief Master", "Rage Quit", "Skill Gap", "Gamer Mode",
    "Touched Solar", "Zero Chill",
];

const PREFIXES: &[&str] = &[
    "Sweat'", "Flawless'", "Focus'", "Speed'", "Clutch'", "React'", "Sharp'", "Quick'",
    "Tactical'", "Primed'", "Elite'", "Pro'", "Peak'", "Optimal'", "Perfect'",
];

/// PvP-flavoured names: an optional prefix, a build type, then an optional
/// playstyle and meme term.
#[derive(Clone, Copy, Debug, Default)]
pub struct PvpNamer;

impl PvpNamer {
    pub fn name_with<R: Rng>(rng: &mut R) -> String {
        let mut parts = Vec::with_capacity(4);
        if rng.gen_bool(0.4) {
            parts.push(pick(rng, PREFIXES));
        }
        parts.push(pick(rng, BUILD_TYPES));
        if rng.gen_bool(0.7) {
            parts.push(pick(rng, PLAYSTYLES));
        }
        if rng.gen_bool(0.6) {
            parts.push(pick(rng, MEME_TERMS));
        }
        parts.join(" ")
    }
}

impl SnapshotNamer for PvpNamer {
    fn name(&self) -> String {
        Self::name_with(&mut rand::thread_rng())
    }
}

fn pick<R: Rng>(rng: &mut R, words: &[&'static str]) -> &'static str {
    words[rng.gen_range(0..words.len())]
}
