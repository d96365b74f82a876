//! A recording document for handler tests.

use crate::document::{FetchParams, PaginatedDocument, UpdateDirective};
use core::cell::RefCell;
use serde_json::Value;
use tessera_core::{Error, QueryResult, Result, Variables};

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Fetch(FetchParams),
    Update(FetchParams, Vec<UpdateDirective>),
}

impl Call {
    pub fn variables(&self) -> Variables {
        match self {
            Call::Fetch(params) | Call::Update(params, _) => params.variables.clone().unwrap_or_default(),
        }
    }
}

#[derive(Default)]
pub struct MockDocument {
    pub state: RefCell<Value>,
    pub variables: RefCell<Variables>,
    pub calls: RefCell<Vec<Call>>,
    pub failure: RefCell<Option<Error>>,
}

impl MockDocument {
    pub fn new(state: Value, variables: Value) -> Self {
        Self {
            state: RefCell::new(state),
            variables: RefCell::new(variables.as_object().cloned().unwrap_or_default()),
            ..Self::default()
        }
    }

    pub fn fail_with(&self, err: Error) {
        *self.failure.borrow_mut() = Some(err);
    }

    pub fn last_call(&self) -> Option<Call> {
        self.calls.borrow().last().cloned()
    }

    fn respond(&self, call: Call) -> Result<QueryResult> {
        let variables = call.variables();
        self.calls.borrow_mut().push(call);
        if let Some(err) = self.failure.borrow().clone() {
            return Err(err);
        }
        Ok(QueryResult::from_network(self.state.borrow().clone(), variables))
    }
}

impl PaginatedDocument for MockDocument {
    fn state(&self) -> Value {
        self.state.borrow().clone()
    }

    fn variables(&self) -> Variables {
        self.variables.borrow().clone()
    }

    async fn fetch(&self, params: FetchParams) -> Result<QueryResult> {
        self.respond(Call::Fetch(params))
    }

    async fn fetch_update(&self, params: FetchParams, directives: &[UpdateDirective]) -> Result<QueryResult> {
        self.respond(Call::Update(params, directives.to_vec()))
    }
}

pub fn vars(value: Value) -> Variables {
    value.as_object().cloned().unwrap_or_default()
}
