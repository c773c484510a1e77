//! Room views
//!
//! Snapshots of room state read out of the store, and the text each one
//! renders to. Rooms themselves live in the store as plain sets.

/// Members of one room at the moment it was read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    /// Member display names, sorted
    pub members: Vec<String>,
}

impl Roster {
    /// Create a roster, sorting the members lexicographically
    pub fn new(mut members: Vec<String>) -> Self {
        members.sort();
        Self { members }
    }

    /// Render the member listing as seen by `me`
    pub fn render_for(&self, me: &str) -> String {
        let mut lines = Vec::with_capacity(self.members.len() + 1);
        lines.push(format!("room members: ({} users)", self.members.len()));
        lines.extend(self.members.iter().map(|name| {
            if name == me {
                format!(" * {} (this is you)", name)
            } else {
                format!(" * {}", name)
            }
        }));
        lines.join("\n")
    }
}

/// A known room and its live member count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSummary {
    pub name: String,
    pub members: usize,
}

/// Render the active room listing
///
/// The registry never forgets a room, so empty ones are skipped here.
pub fn render_active_rooms(rooms: &[RoomSummary]) -> String {
    let mut active: Vec<&RoomSummary> = rooms.iter().filter(|r| r.members > 0).collect();
    active.sort_by(|a, b| a.name.cmp(&b.name));

    let mut lines = vec!["Active rooms are:".to_string()];
    lines.extend(
        active
            .iter()
            .map(|r| format!(" * {} ({})", r.name, r.members)),
    );
    lines.join("\n")
}
