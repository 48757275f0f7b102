use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::db::EventDb;
use crate::logsink::LogSink;

/// Produces the partner assignments for one pairing run: a uniform shuffle
/// followed by cyclic successor assignment, so the partner relation is a
/// single cycle over everyone eligible. The relation is directed; A gifting
/// to B does not mean B gifts to A.
///
/// Zero or one eligible participants produce no assignments. A lone
/// participant would otherwise be paired with themselves.
pub fn cycle_assignments<R: Rng>(mut eligible: Vec<String>, rng: &mut R) -> Vec<(String, String)> {
    eligible.shuffle(rng);

    match eligible.len() {
        0 | 1 => Vec::new(),
        n => (0..n)
            .map(|i| (eligible[i].clone(), eligible[(i + 1) % n].clone()))
            .collect(),
    }
}

/// Runs the pairing over every non-banned participant.
///
/// Each assignment is committed and reported individually; there is no
/// run-level transaction, so a failure mid-run leaves a committed prefix.
/// The caller only marks the event started after this returns, which makes
/// a failed run safe to retrigger from scratch.
pub async fn pair_participants(db: &EventDb, sink: &LogSink) -> anyhow::Result<usize> {
    let eligible = db.eligible_snowflakes().await?;

    if eligible.len() == 1 {
        sink.warn("Pairing requested with a single eligible participant, nobody was paired");
        return Ok(0);
    }

    let assignments = cycle_assignments(eligible, &mut rand::thread_rng());

    for (from, to) in &assignments {
        db.set_partner(from, to).await?;
        sink.info(format!("Paired {} -> {}", from, to));
    }

    Ok(assignments.len())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::core::db::tests::participant;

    fn snowflakes(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}", 100 + i)).collect()
    }

    #[test]
    fn test_empty_and_single_are_no_ops() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(cycle_assignments(vec![], &mut rng).is_empty());
        assert!(cycle_assignments(snowflakes(1), &mut rng).is_empty());
    }

    #[test]
    fn test_everyone_paired_never_with_themselves() {
        for n in 2..20 {
            let mut rng = StdRng::seed_from_u64(n as u64);
            let assignments = cycle_assignments(snowflakes(n), &mut rng);

            assert_eq!(assignments.len(), n);
            for (from, to) in &assignments {
                assert_ne!(from, to);
            }
        }
    }

    #[test]
    fn test_assignment_is_one_full_cycle() {
        let n = 11;
        let mut rng = StdRng::seed_from_u64(42);
        let assignments = cycle_assignments(snowflakes(n), &mut rng);

        let partner_of: HashMap<_, _> = assignments.into_iter().collect();
        assert_eq!(partner_of.len(), n);

        // Following partner links from any node must visit all n
        // participants before coming back around.
        let start = partner_of.keys().next().unwrap().clone();
        let mut current = start.clone();
        for _ in 0..n {
            current = partner_of[&current].clone();
        }
        assert_eq!(current, start);

        let mut seen = std::collections::HashSet::new();
        let mut current = start.clone();
        while seen.insert(current.clone()) {
            current = partner_of[&current].clone();
        }
        assert_eq!(seen.len(), n);
    }

    #[tokio::test]
    async fn test_pairing_run_covers_eligible_only() {
        let db = EventDb::open_in_memory().await.unwrap();
        for i in 1..=5 {
            db.add_participant(&participant(&i.to_string())).await.unwrap();
        }
        db.ban_participant("3", "spam").await.unwrap();

        let (sink, _task) = LogSink::start(64);
        let paired = pair_participants(&db, &sink).await.unwrap();
        assert_eq!(paired, 4);

        for participant in db.get_all_participants().await.unwrap() {
            if participant.snowflake == "3" {
                assert_eq!(participant.partner, None);
            } else {
                let partner = participant.partner.expect("eligible participant unpaired");
                assert_ne!(partner, participant.snowflake);
                assert_ne!(partner, "3");
            }
        }
    }

    #[tokio::test]
    async fn test_single_participant_run_assigns_nobody() {
        let db = EventDb::open_in_memory().await.unwrap();
        db.add_participant(&participant("1")).await.unwrap();

        let (sink, _task) = LogSink::start(64);
        let paired = pair_participants(&db, &sink).await.unwrap();

        assert_eq!(paired, 0);
        let lone = db.find_participant("1").await.unwrap().unwrap();
        assert_eq!(lone.partner, None);
    }
}
