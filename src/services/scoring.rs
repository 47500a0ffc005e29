//! Points awarded when a question closes.

use std::time::{Duration, SystemTime};

use uuid::Uuid;

use crate::dao::models::AnswerEntity;

/// Points for any correct answer.
pub const BASE_POINTS: i64 = 1000;
/// Extra points for a correct answer given the instant the question opened.
pub const MAX_SPEED_BONUS: f64 = 500.0;

/// Points earned by one player for one closed question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Award {
    pub player_token: Uuid,
    pub points: i64,
}

/// Points for a correct answer recorded at `answered_at`.
///
/// Time left is clamped at zero, so an answer stamped slightly past the deadline
/// still earns the base points.
pub fn points_for(ends_at: SystemTime, answered_at: SystemTime, duration: Duration) -> i64 {
    let time_left = ends_at
        .duration_since(answered_at)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64();
    let duration = duration.as_secs_f64().max(1.0);
    let bonus = ((time_left / duration) * MAX_SPEED_BONUS).floor().max(0.0);
    BASE_POINTS + bonus as i64
}

/// Awards for every correct answer; wrong answers earn nothing and are omitted.
pub fn score_answers(
    answers: &[AnswerEntity],
    correct_index: usize,
    ends_at: SystemTime,
    duration: Duration,
) -> Vec<Award> {
    answers
        .iter()
        .filter(|answer| usize::try_from(answer.option_index).ok() == Some(correct_index))
        .map(|answer| Award {
            player_token: answer.player_token,
            points: points_for(ends_at, answer.answered_at, duration),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DURATION: Duration = Duration::from_secs(15);

    fn deadline() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn answer(option_index: i32, answered_at: SystemTime) -> AnswerEntity {
        AnswerEntity {
            room_id: Uuid::nil(),
            player_token: Uuid::new_v4(),
            question_index: 0,
            option_index,
            answered_at,
        }
    }

    #[test]
    fn answering_at_the_deadline_earns_base_points() {
        assert_eq!(points_for(deadline(), deadline(), DURATION), 1000);
    }

    #[test]
    fn answering_instantly_earns_the_full_bonus() {
        assert_eq!(points_for(deadline(), deadline() - DURATION, DURATION), 1500);
    }

    #[test]
    fn bonus_is_floored() {
        // 10s left out of 15s is 333.33 bonus points.
        let answered_at = deadline() - Duration::from_secs(10);
        assert_eq!(points_for(deadline(), answered_at, DURATION), 1333);
    }

    #[test]
    fn late_answers_are_clamped_to_zero_time_left() {
        let answered_at = deadline() + Duration::from_millis(40);
        assert_eq!(points_for(deadline(), answered_at, DURATION), 1000);
    }

    #[test]
    fn zero_duration_is_treated_as_one_second() {
        let answered_at = deadline() - Duration::from_millis(500);
        assert_eq!(points_for(deadline(), answered_at, Duration::ZERO), 1250);
    }

    #[test]
    fn only_correct_answers_are_awarded() {
        let answers = vec![
            answer(1, deadline() - Duration::from_secs(15)),
            answer(2, deadline() - Duration::from_secs(15)),
            answer(1, deadline()),
        ];
        let awards = score_answers(&answers, 1, deadline(), DURATION);

        assert_eq!(
            awards,
            vec![
                Award {
                    player_token: answers[0].player_token,
                    points: 1500
                },
                Award {
                    player_token: answers[2].player_token,
                    points: 1000
                },
            ]
        );
        assert!(score_answers(&answers, 3, deadline(), DURATION).is_empty());
    }
}
