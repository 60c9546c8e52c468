use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::room::models::{PlayerEntry, PlayerRecord, ResultRecord, Room};

/// Higher score first; on equal scores the faster recorded time wins, and a
/// recorded time beats none
pub fn compare_results(a: &ResultRecord, b: &ResultRecord) -> Ordering {
    b.score.cmp(&a.score).then_with(|| match (a.time, b.time) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    /// 1-based; entries that compare equal share a rank
    pub rank: usize,
    pub player_id: String,
    pub name: String,
    pub score: i64,
    pub time: Option<u64>,
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaderboard {
    pub ranking: Vec<RankedEntry>,
    pub still_playing: Vec<PlayerEntry>,
}

impl Leaderboard {
    pub fn compute(
        players: &BTreeMap<String, PlayerRecord>,
        results: &BTreeMap<String, ResultRecord>,
    ) -> Self {
        let joined_at = |id: &str| players.get(id).map_or(i64::MAX, |p| p.joined_at);

        let mut finished: Vec<(&String, &ResultRecord)> = results.iter().collect();
        // join order first so equal results keep a stable, meaningful order
        finished.sort_by(|(a, _), (b, _)| joined_at(a).cmp(&joined_at(b)).then_with(|| a.cmp(b)));
        finished.sort_by(|(_, a), (_, b)| compare_results(a, b));

        let mut ranking: Vec<RankedEntry> = Vec::with_capacity(finished.len());
        for (index, (player_id, result)) in finished.iter().enumerate() {
            let rank = match (index.checked_sub(1).map(|i| finished[i].1), ranking.last()) {
                (Some(prev), Some(prev_entry)) if compare_results(prev, result) == Ordering::Equal => {
                    prev_entry.rank
                }
                _ => index + 1,
            };
            ranking.push(RankedEntry {
                rank,
                player_id: (*player_id).clone(),
                name: players
                    .get(*player_id)
                    .map_or_else(|| (*player_id).clone(), |p| p.name.clone()),
                score: result.score,
                time: result.time,
                details: result.details.clone(),
            });
        }

        Self {
            ranking,
            still_playing: still_playing(players),
        }
    }

    pub fn from_room(room: &Room) -> Self {
        Self::compute(&room.players, &room.results)
    }

    pub fn is_settled(&self) -> bool {
        self.still_playing.is_empty()
    }
}

/// Players neither finished nor disconnected, in join order
pub fn still_playing(players: &BTreeMap<String, PlayerRecord>) -> Vec<PlayerEntry> {
    let mut waiting: Vec<PlayerEntry> = players
        .iter()
        .filter(|(_, p)| p.is_still_playing())
        .map(|(id, record)| PlayerEntry {
            id: id.clone(),
            record: record.clone(),
        })
        .collect();
    waiting.sort_by(|a, b| {
        a.record
            .joined_at
            .cmp(&b.record.joined_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    waiting
}
