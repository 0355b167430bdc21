use mhttp::http::request::Method;
use mhttp::http::response::Response;
use mhttp::routing::{Endpoint, Route, RouteError, RouteTable, TemplatePart, get, post};

fn no_op(endpoint: mhttp::routing::EndpointBuilder) -> Endpoint {
    endpoint.with_action(|| {})
}

fn sample_table() -> RouteTable {
    RouteTable::new(vec![
        no_op(get("/files/*").unwrap()),
        no_op(get("/accounts/{id}").unwrap()),
        no_op(get("/").unwrap()),
        no_op(post("/accounts/").unwrap()),
        no_op(get("/accounts/{id}/data").unwrap()),
        no_op(get("/*").unwrap()),
    ])
}

fn matched_template(table: &RouteTable, method: Method, path: &str) -> Option<String> {
    table
        .try_match(method, path)
        .map(|m| table[m.index].route.template().to_string())
}

#[test]
fn test_root_matches_root_route() {
    let table = sample_table();
    assert_eq!(matched_template(&table, Method::GET, "/").as_deref(), Some("/"));
}

#[test]
fn test_variable_capture_with_query() {
    let table = sample_table();
    let m = table.try_match(Method::GET, "/accounts/111/data?keys=name").unwrap();

    assert_eq!(table[m.index].route.template(), "/accounts/{id}/data");
    assert_eq!(m.path_variables.get("id").map(String::as_str), Some("111"));
    assert_eq!(m.wildcard, None);
}

#[test]
fn test_method_mismatch_is_no_match() {
    let table = sample_table();

    assert!(table.try_match(Method::POST, "/accounts/111/data").is_none());
    assert!(table.try_match(Method::POST, "/").is_none());
    assert!(table.try_match(Method::DELETE, "/files/a").is_none());
}

#[test]
fn test_wildcard_captures_remainder() {
    let table = sample_table();
    let m = table.try_match(Method::GET, "/files/images/test.png").unwrap();

    assert_eq!(table[m.index].route.template(), "/files/*");
    assert_eq!(m.wildcard.as_deref(), Some("images/test.png"));
    assert!(m.path_variables.is_empty());
}

#[test]
fn test_single_variable_route() {
    let table = sample_table();
    let m = table.try_match(Method::GET, "/accounts/222").unwrap();

    assert_eq!(table[m.index].route.template(), "/accounts/{id}");
    assert_eq!(m.path_variables["id"], "222");
}

#[test]
fn test_catch_all_wildcard() {
    let table = sample_table();
    assert_eq!(
        matched_template(&table, Method::GET, "/whatever").as_deref(),
        Some("/*")
    );
}

#[test]
fn test_trailing_slash_is_ignored() {
    let table = sample_table();
    assert_eq!(
        matched_template(&table, Method::POST, "/accounts").as_deref(),
        Some("/accounts/")
    );
}

#[test]
fn test_literal_beats_variable_regardless_of_registration_order() {
    let table = RouteTable::new(vec![
        no_op(get("/accounts/{id}").unwrap()),
        no_op(get("/accounts/me").unwrap()),
    ]);

    assert_eq!(
        matched_template(&table, Method::GET, "/accounts/me").as_deref(),
        Some("/accounts/me")
    );
    assert_eq!(
        matched_template(&table, Method::GET, "/accounts/7").as_deref(),
        Some("/accounts/{id}")
    );
}

#[test]
fn test_equal_specificity_keeps_registration_order() {
    let table = RouteTable::new(vec![
        get("/items/{a}").unwrap().with(|_| Ok(Response::text("first"))),
        get("/items/{b}").unwrap().with(|_| Ok(Response::text("second"))),
    ]);

    let m = table.try_match(Method::GET, "/items/1").unwrap();
    assert_eq!(table[m.index].route.template(), "/items/{a}");
    assert_eq!(m.path_variables.get("a").map(String::as_str), Some("1"));
}

#[test]
fn test_table_is_sorted_by_specificity() {
    let table = sample_table();
    let weights: Vec<Vec<u8>> = table
        .iter()
        .map(|ep| ep.route.parts().iter().map(TemplatePart::weight).collect())
        .collect();

    let mut sorted = weights.clone();
    sorted.sort();
    assert_eq!(weights, sorted);
}

#[test]
fn test_wildcard_must_be_last() {
    assert_eq!(
        Route::parse("/files/*/meta"),
        Err(RouteError::WildcardNotLast("/files/*/meta".to_string()))
    );
}

#[test]
fn test_duplicate_variable_rejected() {
    assert!(matches!(
        Route::parse("/pairs/{id}/{id}"),
        Err(RouteError::DuplicateVariable { name, .. }) if name == "id"
    ));
}

#[test]
fn test_malformed_variable_rejected() {
    assert!(matches!(
        Route::parse("/accounts/{id"),
        Err(RouteError::InvalidVariable { .. })
    ));
    assert!(matches!(
        Route::parse("/accounts/{}"),
        Err(RouteError::InvalidVariable { .. })
    ));
}

#[test]
fn test_builder_propagates_route_errors() {
    assert!(get("/a/*/b").is_err());
}

#[test]
fn test_rate_limited_endpoints_expose_buckets() {
    let table = RouteTable::new(vec![
        no_op(get("/free").unwrap()),
        no_op(get("/limited").unwrap()).limit_rate(2),
        no_op(get("/burst").unwrap()).limit_rate_burst(1, 5),
    ]);

    let buckets = table.buckets();
    assert_eq!(buckets.len(), 2);

    let mut capacities: Vec<u32> = buckets.iter().map(|b| b.capacity()).collect();
    capacities.sort();
    assert_eq!(capacities, vec![2, 5]);
}

#[test]
fn test_admit_exhausts_bucket() {
    let endpoint = no_op(get("/limited").unwrap()).limit_rate(2);

    assert!(endpoint.admit());
    assert!(endpoint.admit());
    assert!(!endpoint.admit());

    let free = no_op(get("/free").unwrap());
    for _ in 0..100 {
        assert!(free.admit());
    }
}
