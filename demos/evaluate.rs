use std::sync::Arc;

use mesh_authz::{PolicyEvaluator, PolicyStore, RequestContext, Result};

fn main() -> Result<()> {
    let json = r#"{
        "schemaVersion": "2023-06-01",
        "deny": [
            {
                "name": "block-debug-from-outside",
                "isLeaf": false,
                "operator": "and",
                "children": [
                    { "conditionType": "path", "matcherType": "prefix", "matcherValue": "/debug" },
                    {
                        "operator": "or",
                        "negate": true,
                        "children": [
                            { "conditionType": "sourceIp", "matcherType": "cidr", "matcherValue": "10.0.0.0/8" }
                        ]
                    }
                ]
            }
        ],
        "allow": [
            { "name": "api", "conditionType": "path", "matcherType": "prefix", "matcherValue": "/api/" },
            { "name": "debug", "conditionType": "path", "matcherType": "prefix", "matcherValue": "/debug" }
        ]
    }"#;

    let store = Arc::new(PolicyStore::default());
    store.update_policy_json(json)?;
    let evaluator = PolicyEvaluator::new(store);

    let requests = vec![
        ("203.0.113.7", "/api/orders"),
        ("203.0.113.7", "/debug/pprof"),
        ("10.1.2.3", "/debug/pprof"),
        ("10.1.2.3", "/metrics"),
    ];

    for (source_ip, path) in requests {
        let mut request = RequestContext::builder()
            .source_ip(source_ip)
            .method("GET")
            .path(path)
            .build();
        let decision = evaluator.authorize(&mut request);
        println!("{} {} -> {:?}", source_ip, path, decision);
    }

    Ok(())
}
