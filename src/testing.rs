//! Match payloads shared by unit tests.

use serde_json::{Value, json};

use crate::riot::{MatchDetail, MatchDto, TftMatchDto};

pub(crate) fn lol_match_json(match_id: &str, puuid: &str, win: bool) -> Value {
    json!({
        "metadata": { "matchId": match_id },
        "info": {
            "gameCreation": 1_700_000_000_000i64,
            "gameDuration": 1865,
            "queueId": 420,
            "participants": [{
                "puuid": puuid,
                "teamPosition": "MIDDLE",
                "championName": "Ahri",
                "kills": 7,
                "deaths": 2,
                "assists": 11,
                "totalMinionsKilled": 201,
                "neutralMinionsKilled": 12,
                "win": win
            }]
        }
    })
}

pub(crate) fn tft_match_json(match_id: &str, puuid: &str, placement: u8) -> Value {
    json!({
        "metadata": { "match_id": match_id },
        "info": {
            "game_datetime": 1_700_000_000_000i64,
            "game_length": 2110.4,
            "queue_id": 1100,
            "tft_set_number": 13,
            "participants": [{
                "puuid": puuid,
                "placement": placement,
                "level": 8,
                "last_round": 33,
                "total_damage_to_players": 97
            }]
        }
    })
}

pub(crate) fn lol_match(match_id: &str, puuid: &str, win: bool) -> MatchDetail {
    let dto: MatchDto = serde_json::from_value(lol_match_json(match_id, puuid, win))
        .expect("valid lol fixture");
    MatchDetail::Lol(dto)
}

pub(crate) fn tft_match(match_id: &str, puuid: &str, placement: u8) -> MatchDetail {
    let dto: TftMatchDto = serde_json::from_value(tft_match_json(match_id, puuid, placement))
        .expect("valid tft fixture");
    MatchDetail::Tft(dto)
}
