use mesh_authz::{PolicyStore, RequestContext, Result};

fn main() -> Result<()> {
    let json = r#"{
        "services": [
            {
                "targetService": "checkout",
                "defaultVersion": "v1",
                "matchRoutes": [
                    {
                        "version": "v2",
                        "weight": 20,
                        "rules": [
                            { "type": "header", "key": "x-user-tier", "matcherType": "exact", "matcherValue": "beta" }
                        ]
                    },
                    {
                        "version": "v3",
                        "rules": [
                            { "type": "path", "matcherType": "prefix", "matcherValue": "/checkout/express" }
                        ]
                    }
                ]
            }
        ]
    }"#;

    let store = PolicyStore::default();
    store.update_routes_json(json)?;
    let routes = store.load_routes();

    let requests = vec![
        RequestContext::builder().path("/checkout").header("X-User-Tier", "beta").build(),
        RequestContext::builder().path("/checkout/express").build(),
        RequestContext::builder().path("/checkout").build(),
    ];

    for request in &requests {
        if let Some(selection) = routes.select("checkout", request) {
            let weights: Vec<_> = selection.weights().collect();
            println!("{} -> {:?}", request.path, weights);
        }
    }

    Ok(())
}
