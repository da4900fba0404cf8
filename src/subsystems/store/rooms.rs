use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};
use uuid::Uuid;

use super::quizzes::quiz_exists;
use super::schema::now_iso8601;
use super::{
    LeaderboardRow, QuizStore, Room, RoomPlayer, RoomStatus, StoreError, is_unique_violation,
    new_id, opt_uuid_at, uuid_at,
};
use crate::subsystems::scoring::dense_ranks;

const ROOM_COLUMNS: &str = "r.room_id, r.quiz_id, r.pin_code, r.status, r.max_players,
     (SELECT COUNT(*) FROM room_player rp WHERE rp.room_id = r.room_id),
     r.created_at, r.started_at, r.finished_at";

impl QuizStore {
    /// Open a new room in `WAITING`. A PIN collision yields `PinTaken` so the
    /// caller can draw another one.
    pub fn create_room(&self, quiz_id: Uuid, max_players: u32, pin: &str) -> Result<Room, StoreError> {
        let conn = self.lock()?;
        if !quiz_exists(&conn, quiz_id)? {
            return Err(StoreError::not_found("quiz", quiz_id));
        }

        let room_id = new_id();
        conn.execute(
            "INSERT INTO room (room_id, quiz_id, pin_code, status, max_players, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![room_id.to_string(), quiz_id.to_string(), pin, RoomStatus::Waiting, max_players, now_iso8601()],
        )
        .map_err(|e| if is_unique_violation(&e) { StoreError::PinTaken(pin.to_string()) } else { e.into() })?;

        info!(%room_id, %quiz_id, pin, "room created");
        load_room(&conn, pin)?.ok_or_else(|| StoreError::not_found("room", pin))
    }

    pub fn room_by_pin(&self, pin: &str) -> Result<Room, StoreError> {
        let conn = self.lock()?;
        load_room(&conn, pin)?.ok_or_else(|| StoreError::not_found("room", pin))
    }

    /// Seat a player in a waiting room. `player_id` links an optional profile.
    pub fn join_room(&self, pin: &str, nickname: &str, player_id: Option<Uuid>) -> Result<RoomPlayer, StoreError> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(StoreError::Invalid("nickname must not be empty".into()));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let room = load_room(&tx, pin)?.ok_or_else(|| StoreError::not_found("room", pin))?;

        if room.status != RoomStatus::Waiting {
            return Err(StoreError::Conflict(format!("room {pin} is {}, joining is closed", room.status)));
        }
        if room.player_count >= room.max_players {
            return Err(StoreError::Conflict(format!("room {pin} is full ({} players)", room.max_players)));
        }
        if let Some(pid) = player_id {
            let known = tx
                .query_row("SELECT 1 FROM player_profile WHERE player_id = ?1", params![pid.to_string()], |_| Ok(()))
                .optional()?
                .is_some();
            if !known {
                return Err(StoreError::not_found("player", pid));
            }
        }

        let player = RoomPlayer {
            room_player_id: new_id(),
            room_id: room.room_id,
            player_id,
            nickname: nickname.to_string(),
            current_question_index: 0,
            total_points: 0,
            joined_at: now_iso8601(),
        };
        tx.execute(
            "INSERT INTO room_player (room_player_id, room_id, player_id, nickname, joined_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                player.room_player_id.to_string(),
                player.room_id.to_string(),
                player.player_id.map(|p| p.to_string()),
                player.nickname,
                player.joined_at,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("nickname '{nickname}' is already taken in room {pin}"))
            } else {
                e.into()
            }
        })?;
        tx.commit()?;

        info!(pin, nickname, room_player_id = %player.room_player_id, "player joined");
        Ok(player)
    }

    /// Move the room forward one lifecycle step. Finishing also snapshots
    /// the leaderboard.
    pub fn set_room_status(&self, pin: &str, next: RoomStatus) -> Result<Room, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let room = load_room(&tx, pin)?.ok_or_else(|| StoreError::not_found("room", pin))?;

        let stamp_column = match next {
            RoomStatus::Started => Some("started_at"),
            RoomStatus::Finished => Some("finished_at"),
            RoomStatus::Waiting => None,
        };
        let Some(stamp_column) = stamp_column.filter(|_| room.status.can_become(next)) else {
            return Err(StoreError::Conflict(format!("room {pin} is {}, cannot move to {next}", room.status)));
        };

        let now = now_iso8601();
        tx.execute(
            &format!("UPDATE room SET status = ?2, {stamp_column} = ?3 WHERE room_id = ?1"),
            params![room.room_id.to_string(), next, now],
        )?;

        if next == RoomStatus::Finished {
            let rows = ranking(&tx, room.room_id)?;
            for row in &rows {
                tx.execute(
                    "INSERT INTO leaderboard_entry
                         (entry_id, room_id, room_player_id, nickname, rank, total_points, recorded_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        new_id().to_string(),
                        room.room_id.to_string(),
                        row.room_player_id.to_string(),
                        row.nickname,
                        row.rank,
                        row.total_points,
                        now,
                    ],
                )?;
            }
            debug!(pin, entries = rows.len(), "leaderboard snapshot recorded");
        }

        let updated = load_room(&tx, pin)?.ok_or_else(|| StoreError::not_found("room", pin))?;
        tx.commit()?;

        info!(pin, from = %room.status, to = %next, "room status changed");
        Ok(updated)
    }

    /// Live ranking: points descending, earlier joins first on ties.
    pub fn leaderboard(&self, pin: &str) -> Result<Vec<LeaderboardRow>, StoreError> {
        let conn = self.lock()?;
        let room = load_room(&conn, pin)?.ok_or_else(|| StoreError::not_found("room", pin))?;
        ranking(&conn, room.room_id)
    }

    /// Players of a room in join order.
    pub fn room_players(&self, pin: &str) -> Result<Vec<RoomPlayer>, StoreError> {
        let conn = self.lock()?;
        let room = load_room(&conn, pin)?.ok_or_else(|| StoreError::not_found("room", pin))?;
        let mut stmt = conn.prepare(
            "SELECT room_player_id, room_id, player_id, nickname, current_question_index,
                    total_points, joined_at
             FROM room_player WHERE room_id = ?1
             ORDER BY joined_at, rowid",
        )?;
        let players = stmt
            .query_map(params![room.room_id.to_string()], |row| {
                Ok(RoomPlayer {
                    room_player_id: uuid_at(row, 0)?,
                    room_id: uuid_at(row, 1)?,
                    player_id: opt_uuid_at(row, 2)?,
                    nickname: row.get(3)?,
                    current_question_index: row.get(4)?,
                    total_points: row.get(5)?,
                    joined_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(players)
    }
}

pub(super) fn load_room(conn: &Connection, pin: &str) -> Result<Option<Room>, StoreError> {
    let room = conn
        .query_row(
            &format!("SELECT {ROOM_COLUMNS} FROM room r WHERE r.pin_code = ?1"),
            params![pin],
            |row| {
                Ok(Room {
                    room_id: uuid_at(row, 0)?,
                    quiz_id: uuid_at(row, 1)?,
                    pin_code: row.get(2)?,
                    status: row.get(3)?,
                    max_players: row.get(4)?,
                    player_count: row.get(5)?,
                    created_at: row.get(6)?,
                    started_at: row.get(7)?,
                    finished_at: row.get(8)?,
                })
            },
        )
        .optional()?;
    Ok(room)
}

fn ranking(conn: &Connection, room_id: Uuid) -> Result<Vec<LeaderboardRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT room_player_id, nickname, total_points
         FROM room_player WHERE room_id = ?1
         ORDER BY total_points DESC, joined_at, rowid",
    )?;
    let players = stmt
        .query_map(params![room_id.to_string()], |row| {
            Ok((uuid_at(row, 0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let points: Vec<i64> = players.iter().map(|p| p.2).collect();
    let ranks = dense_ranks(&points);
    Ok(players
        .into_iter()
        .zip(ranks)
        .map(|((room_player_id, nickname, total_points), rank)| LeaderboardRow {
            rank,
            room_player_id,
            nickname,
            total_points,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::store::NewQuiz;

    fn store_with_room(max_players: u32) -> (QuizStore, Room) {
        let store = QuizStore::in_memory().unwrap();
        let quiz = store
            .create_quiz(&NewQuiz {
                title: "Room test".into(),
                description: None,
                time_per_question: 15,
                allow_powerups: false,
                questions: vec![],
            })
            .unwrap();
        let room = store.create_room(quiz.quiz_id, max_players, "123456").unwrap();
        (store, room)
    }

    #[test]
    fn new_room_is_waiting_and_empty() {
        let (_store, room) = store_with_room(10);
        assert_eq!(room.status, RoomStatus::Waiting);
        assert_eq!(room.player_count, 0);
        assert_eq!(room.pin_code, "123456");
        assert!(room.started_at.is_none());
    }

    #[test]
    fn duplicate_pin_is_reported() {
        let (store, room) = store_with_room(10);
        let err = store.create_room(room.quiz_id, 10, "123456").unwrap_err();
        assert!(matches!(err, StoreError::PinTaken(ref p) if p == "123456"));
    }

    #[test]
    fn room_for_missing_quiz() {
        let store = QuizStore::in_memory().unwrap();
        let err = store.create_room(Uuid::new_v4(), 10, "654321").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "quiz", .. }));
    }

    #[test]
    fn join_rules() {
        let (store, _) = store_with_room(2);
        store.join_room("123456", "ana", None).unwrap();
        assert!(matches!(store.join_room("123456", "ana", None), Err(StoreError::Conflict(_))));
        assert!(matches!(store.join_room("123456", "  ", None), Err(StoreError::Invalid(_))));
        store.join_room("123456", "rui", None).unwrap();
        let err = store.join_room("123456", "eva", None).unwrap_err();
        assert!(err.to_string().contains("full"));
        assert!(matches!(store.join_room("000000", "x", None), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn join_with_unknown_profile() {
        let (store, _) = store_with_room(5);
        let err = store.join_room("123456", "ana", Some(Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "player", .. }));
    }

    #[test]
    fn join_with_profile_links_it() {
        let (store, _) = store_with_room(5);
        let profile = store.register_player("ext", "Ana").unwrap();
        let p = store.join_room("123456", "ana", Some(profile.player_id)).unwrap();
        assert_eq!(p.player_id, Some(profile.player_id));
    }

    #[test]
    fn lifecycle_is_enforced() {
        let (store, _) = store_with_room(5);
        store.join_room("123456", "ana", None).unwrap();
        assert!(matches!(store.set_room_status("123456", RoomStatus::Finished), Err(StoreError::Conflict(_))));

        let started = store.set_room_status("123456", RoomStatus::Started).unwrap();
        assert_eq!(started.status, RoomStatus::Started);
        assert!(started.started_at.is_some());
        assert!(matches!(store.join_room("123456", "late", None), Err(StoreError::Conflict(_))));

        let finished = store.set_room_status("123456", RoomStatus::Finished).unwrap();
        assert!(finished.finished_at.is_some());
        assert!(store.set_room_status("123456", RoomStatus::Started).is_err());

        let conn = store.lock().unwrap();
        let snapshot: i64 = conn.query_row("SELECT COUNT(*) FROM leaderboard_entry", [], |r| r.get(0)).unwrap();
        assert_eq!(snapshot, 1);
    }

    #[test]
    fn moving_back_to_waiting_is_refused() {
        let (store, room) = store_with_room(5);
        let err = store.set_room_status("123456", RoomStatus::Waiting).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.room_by_pin("123456").unwrap().created_at, room.created_at);
    }

    fn set_points(store: &QuizStore, points: &[(&RoomPlayer, i64)]) {
        let conn = store.lock().unwrap();
        for (player, pts) in points {
            conn.execute(
                "UPDATE room_player SET total_points = ?2 WHERE room_player_id = ?1",
                params![player.room_player_id.to_string(), pts],
            )
            .unwrap();
        }
    }

    #[test]
    fn finishing_records_the_ranking() {
        let (store, room) = store_with_room(5);
        let a = store.join_room("123456", "a", None).unwrap();
        let b = store.join_room("123456", "b", None).unwrap();
        let c = store.join_room("123456", "c", None).unwrap();
        store.set_room_status("123456", RoomStatus::Started).unwrap();
        set_points(&store, &[(&a, 100), (&b, 250), (&c, 100)]);
        store.set_room_status("123456", RoomStatus::Finished).unwrap();

        // Later changes must not leak into the snapshot.
        set_points(&store, &[(&c, 999)]);

        let conn = store.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT room_id, room_player_id, nickname, rank, total_points, recorded_at
                 FROM leaderboard_entry ORDER BY rank, nickname",
            )
            .unwrap();
        let rows: Vec<(String, String, String, u32, i64, String)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        let view: Vec<_> = rows.iter().map(|r| (r.2.as_str(), r.3, r.4)).collect();
        assert_eq!(view, vec![("b", 1, 250), ("a", 2, 100), ("c", 2, 100)]);
        assert!(rows.iter().all(|r| r.0 == room.room_id.to_string() && !r.5.is_empty()));
        assert_eq!(rows[0].1, b.room_player_id.to_string());
    }

    #[test]
    fn leaderboard_ties_share_rank() {
        let (store, _) = store_with_room(5);
        let a = store.join_room("123456", "a", None).unwrap();
        let b = store.join_room("123456", "b", None).unwrap();
        let c = store.join_room("123456", "c", None).unwrap();
        {
            let conn = store.lock().unwrap();
            for (id, pts) in [(a.room_player_id, 100), (b.room_player_id, 250), (c.room_player_id, 100)] {
                conn.execute(
                    "UPDATE room_player SET total_points = ?2 WHERE room_player_id = ?1",
                    params![id.to_string(), pts],
                )
                .unwrap();
            }
        }

        let board = store.leaderboard("123456").unwrap();
        let view: Vec<_> = board.iter().map(|r| (r.nickname.as_str(), r.rank, r.total_points)).collect();
        assert_eq!(view, vec![("b", 1, 250), ("a", 2, 100), ("c", 2, 100)]);
    }

    #[test]
    fn players_listed_in_join_order() {
        let (store, _) = store_with_room(5);
        store.join_room("123456", "z", None).unwrap();
        store.join_room("123456", "a", None).unwrap();
        let names: Vec<_> = store.room_players("123456").unwrap().into_iter().map(|p| p.nickname).collect();
        assert_eq!(names, vec!["z", "a"]);
        assert_eq!(store.room_by_pin("123456").unwrap().player_count, 2);
    }
}
