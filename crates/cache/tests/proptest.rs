//! Property-based tests for tessera-cache using proptest.

use proptest::prelude::*;
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use tessera_cache::reactive::SubscriptionSpec;
use tessera_cache::{Cache, FieldSelection, Selection, Variables, WriteArgs, ROOT_ID};

#[derive(Clone, Copy, Debug)]
enum Shape {
    /// A scalar field of the root record.
    RootScalar,
    /// A root field linking to a user.
    RootViewer,
    /// A fragment on one user.
    Fragment(usize),
}

fn shape_strategy(users: usize) -> impl Strategy<Value = Shape> {
    prop_oneof![
        Just(Shape::RootScalar),
        Just(Shape::RootViewer),
        (0..users).prop_map(Shape::Fragment),
    ]
}

fn user_fields() -> Selection {
    Selection::new()
        .field("id", FieldSelection::scalar("id", "ID"))
        .field("name", FieldSelection::scalar("name", "String"))
}

fn populate(cache: &mut Cache, users: usize) {
    let selection = Selection::new()
        .field("count", FieldSelection::scalar("count", "Int"))
        .field("viewer", FieldSelection::linked("viewer", "User", user_fields()))
        .field("users", FieldSelection::linked("users", "User", user_fields()));
    let list: Vec<_> = (0..users)
        .map(|i| json!({ "id": i.to_string(), "name": format!("user {}", i) }))
        .collect();
    cache
        .write(WriteArgs {
            selection: &selection,
            data: &json!({ "count": users, "viewer": list[0].clone(), "users": list }),
            variables: &Variables::new(),
            parent: None,
        })
        .unwrap();
}

fn spec_for(shape: Shape, index: usize, notified: &Rc<RefCell<Vec<usize>>>) -> Rc<SubscriptionSpec> {
    let notified = notified.clone();
    let set = move |_: &serde_json::Value| notified.borrow_mut().push(index);
    let spec = match shape {
        Shape::RootScalar => SubscriptionSpec::new(
            "Query",
            Rc::new(Selection::new().field("count", FieldSelection::scalar("count", "Int"))),
            set,
        ),
        Shape::RootViewer => SubscriptionSpec::new(
            "Query",
            Rc::new(Selection::new().field("viewer", FieldSelection::linked("viewer", "User", user_fields()))),
            set,
        ),
        Shape::Fragment(user) => {
            SubscriptionSpec::new("User", Rc::new(user_fields()), set).with_parent(format!("User:{}", user))
        }
    };
    Rc::new(spec)
}

proptest! {
    #[test]
    fn reset_drops_exactly_non_root_subscribers(
        users in 1usize..6,
        shapes in prop::collection::vec(shape_strategy(5), 1..12),
    ) {
        let mut cache: Cache = Cache::default();
        populate(&mut cache, users);

        let notified = Rc::new(RefCell::new(Vec::new()));
        let mut specs = Vec::new();
        for (index, shape) in shapes.iter().enumerate() {
            let shape = match shape {
                Shape::Fragment(user) => Shape::Fragment(user % users),
                other => *other,
            };
            let spec = spec_for(shape, index, &notified);
            cache.subscribe(&spec, &Variables::new()).unwrap();
            specs.push((shape, spec));
        }

        cache.reset();

        let mut expected: Vec<usize> = specs
            .iter()
            .enumerate()
            .filter(|(_, (shape, _))| !matches!(shape, Shape::RootScalar))
            .map(|(index, _)| index)
            .collect();
        let mut dropped = notified.borrow().clone();
        expected.sort_unstable();
        dropped.sort_unstable();
        prop_assert_eq!(dropped, expected);

        for (shape, spec) in &specs {
            match shape {
                Shape::RootScalar => {
                    prop_assert_eq!(cache.subscriptions().reference_count(ROOT_ID, "count", spec.handle()), 1);
                }
                Shape::RootViewer => {
                    prop_assert_eq!(cache.subscriptions().reference_count(ROOT_ID, "viewer", spec.handle()), 1);
                }
                Shape::Fragment(_) => {}
            }
        }
        for user in 0..users {
            let key = format!("User:{}", user);
            prop_assert!(cache.subscriptions().active_fields(&key).is_empty());
        }
    }

    #[test]
    fn subscribe_then_unsubscribe_restores_size(
        users in 1usize..6,
        shapes in prop::collection::vec(shape_strategy(5), 1..8),
    ) {
        let mut cache: Cache = Cache::default();
        populate(&mut cache, users);
        let notified = Rc::new(RefCell::new(Vec::new()));

        for (index, shape) in shapes.iter().enumerate() {
            let shape = match shape {
                Shape::Fragment(user) => Shape::Fragment(user % users),
                other => *other,
            };
            let before = cache.subscriptions().size();
            let spec = spec_for(shape, index, &notified);
            cache.subscribe(&spec, &Variables::new()).unwrap();
            prop_assert!(cache.subscriptions().size() > before);
            cache.unsubscribe(&spec, &Variables::new());
            prop_assert_eq!(cache.subscriptions().size(), before);
        }
    }
}
