// CSV export of a league table.

use std::io::Write;

use crate::error::Result;
use crate::model::StandingsEntry;

const HEADER: [&str; 11] = [
    "position",
    "club_id",
    "club_name",
    "played",
    "won",
    "drawn",
    "lost",
    "goals_for",
    "goals_against",
    "goal_difference",
    "points",
];

/// Write `standings` as CSV with a header row, in table order.
pub fn write_standings_csv<W: Write>(writer: W, standings: &[StandingsEntry]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(HEADER)?;

    for entry in standings {
        wtr.write_record([
            entry.position.to_string(),
            entry.club_id.clone(),
            entry.club_name.clone(),
            entry.matches_played.to_string(),
            entry.matches_won.to_string(),
            entry.matches_drawn.to_string(),
            entry.matches_lost.to_string(),
            entry.goals_for.to_string(),
            entry.goals_against.to_string(),
            entry.goal_difference.to_string(),
            entry.points.to_string(),
        ])?;
    }

    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Convenience wrapper returning the CSV as a string.
pub fn standings_csv(standings: &[StandingsEntry]) -> Result<String> {
    let mut buf = Vec::new();
    write_standings_csv(&mut buf, standings)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
