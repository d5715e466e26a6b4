//! Oracle functions for scenario verification.
//!
//! Oracles run after the simulation and check global properties of the
//! [`Outcome`]. Each returns `Ok(())` if the property holds and a
//! description of the first violation otherwise.

use std::collections::BTreeMap;

use lamport_proto::{EventKind, EventLogEntry, ProcessId};

use crate::scenario::Outcome;

/// Oracle function type.
pub type OracleFn = Box<dyn FnOnce(&Outcome) -> Result<(), String>>;

/// No two processes were ever inside the critical section at once.
pub fn mutual_exclusion() -> OracleFn {
    Box::new(|outcome| match outcome.overlaps().first() {
        None => Ok(()),
        Some(overlap) => Err(format!(
            "process {} entered the critical section while {} held it",
            overlap.intruder, overlap.holder
        )),
    })
}

/// Every process ran until its budget expired.
pub fn all_completed() -> OracleFn {
    Box::new(|outcome| {
        for process in outcome.processes() {
            if let Some(err) = outcome.error(process) {
                return Err(format!("process {process} failed: {err}"));
            }
        }
        Ok(())
    })
}

/// Every request issued was served.
pub fn all_admitted() -> OracleFn {
    Box::new(|outcome| {
        for report in outcome.reports() {
            if report.admissions != report.attempts {
                return Err(format!(
                    "process {} was admitted {} times for {} requests",
                    report.process, report.admissions, report.attempts
                ));
            }
        }
        Ok(())
    })
}

/// The section was granted in the total order of requests.
pub fn admission_order() -> OracleFn {
    Box::new(|outcome| {
        for pair in outcome.occupancies().windows(2) {
            if pair[0].request >= pair[1].request {
                return Err(format!("{} was served after {}", pair[1].request, pair[0].request));
            }
        }
        Ok(())
    })
}

/// The per-process event logs are mutually consistent.
pub fn logs_consistent() -> OracleFn {
    Box::new(|outcome| verify_event_logs(outcome.logs()))
}

/// Combine multiple oracles into one.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |outcome| {
        for oracle in oracles {
            oracle(outcome)?;
        }
        Ok(())
    })
}

/// Check a set of event logs against each other.
///
/// - timestamps strictly increase within every log
/// - no log contains COMPUTE
/// - the k-th RECEIVE at B from A matches the k-th SEND at A to B: same kind,
///   same payload, strictly larger timestamp
///
/// Sends that were never received are allowed, since a run can end with
/// messages in flight.
pub fn verify_event_logs(logs: &BTreeMap<ProcessId, Vec<EventLogEntry>>) -> Result<(), String> {
    for (&owner, entries) in logs {
        if let Some(pair) = entries.windows(2).find(|w| w[0].timestamp >= w[1].timestamp) {
            return Err(format!(
                "process {owner}: timestamp {} follows {}",
                pair[1].timestamp, pair[0].timestamp
            ));
        }
        if let Some(entry) = entries.iter().find(|e| e.event == EventKind::Compute) {
            return Err(format!("process {owner}: unexpected COMPUTE at {}", entry.timestamp));
        }
    }

    for (&sender, sent) in logs {
        for (&receiver, received) in logs {
            if sender == receiver {
                continue;
            }

            let mut sends =
                sent.iter().filter(|e| e.event == EventKind::Send && e.peer == receiver);
            let receives: Vec<&EventLogEntry> = received
                .iter()
                .filter(|e| e.event == EventKind::Receive && e.peer == sender)
                .collect();

            for (index, receive) in receives.iter().enumerate() {
                let Some(send) = sends.next() else {
                    return Err(format!(
                        "process {receiver} logged {} receipts from {sender}, which sent only {index}",
                        receives.len()
                    ));
                };

                if send.info != receive.info || send.payload != receive.payload {
                    return Err(format!(
                        "message {index} from {sender} to {receiver}: sent {}:{}, received {}:{}",
                        send.info, send.payload, receive.info, receive.payload
                    ));
                }
                if receive.timestamp <= send.timestamp {
                    return Err(format!(
                        "message {index} from {sender} to {receiver}: received at {} but sent at {}",
                        receive.timestamp, send.timestamp
                    ));
                }
            }
        }
    }

    Ok(())
}
