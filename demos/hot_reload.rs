use std::sync::Arc;
use std::thread;

use mesh_authz::{PolicyEvaluator, PolicyStore, RequestContext, Result};

const OPEN: &str = r#"{ "allow": [] }"#;

const LOCKED: &str = r#"{
    "allow": [
        { "name": "health", "conditionType": "path", "matcherType": "exact", "matcherValue": "/health" }
    ]
}"#;

fn main() -> Result<()> {
    let store = Arc::new(PolicyStore::default());
    store.update_policy_json(OPEN)?;

    let workers: Vec<_> = (0..4)
        .map(|id| {
            let evaluator = PolicyEvaluator::new(Arc::clone(&store));
            thread::spawn(move || {
                let mut denied = 0;
                for _ in 0..10_000 {
                    let mut request = RequestContext::builder().path("/orders").build();
                    if evaluator.authorize(&mut request).is_denied() {
                        denied += 1;
                    }
                }
                println!("worker {} saw {} denials", id, denied);
            })
        })
        .collect();

    for round in 0..100 {
        let json = if round % 2 == 0 { LOCKED } else { OPEN };
        store.update_policy_json(json)?;
    }

    // an invalid update is rejected and the previous policy stays active.
    if let Err(e) = store.update_policy_json(r#"{ "allow": [ { "name": "broken" } ] }"#) {
        println!("update rejected: {}", e);
    }

    for worker in workers {
        let _ = worker.join();
    }

    Ok(())
}
