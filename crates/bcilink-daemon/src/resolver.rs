//! Recipient keys available to custom variables
//!
//! Producers:
//! - `clock`: seconds since the resolver was created
//! - `object.<name>.x|y|z|speed`: live values of a simulated object
//! - `constant.<value>`: a fixed number
//!
//! Consumers:
//! - `log`: logs each value change
//! - `record.<key>`: keeps the latest value under `key`

use bcilink_core::{Consumer, ObjectSource, Producer, Resolver};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;
use tracing::info;

use crate::simulation::SimulatedObject;

pub struct BuiltinResolver {
    started: Instant,
    objects: HashMap<String, Rc<SimulatedObject>>,
    records: Rc<RefCell<HashMap<String, i32>>>,
}

impl BuiltinResolver {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            objects: HashMap::new(),
            records: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    pub fn add_object(&mut self, object: Rc<SimulatedObject>) {
        self.objects.insert(object.name().to_string(), object);
    }

    /// Latest values received by `record.<key>` consumers
    pub fn records(&self) -> Rc<RefCell<HashMap<String, i32>>> {
        self.records.clone()
    }

    fn object_producer(&self, name: &str, field: &str) -> Option<Box<dyn Producer>> {
        let object = self.objects.get(name)?.clone();
        let producer: Box<dyn Producer> = match field {
            "x" => Box::new(move || object.position()[0]),
            "y" => Box::new(move || object.position()[1]),
            "z" => Box::new(move || object.position()[2]),
            "speed" => Box::new(move || object.speed().unwrap_or(0.0)),
            _ => return None,
        };
        Some(producer)
    }
}

impl Default for BuiltinResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver for BuiltinResolver {
    fn producer(&mut self, recipient: &str) -> Option<Box<dyn Producer>> {
        if recipient == "clock" {
            let started = self.started;
            return Some(Box::new(move || started.elapsed().as_secs_f32()));
        }
        if let Some(value) = recipient.strip_prefix("constant.") {
            let value: f32 = value.parse().ok()?;
            return Some(Box::new(move || value));
        }
        let path = recipient.strip_prefix("object.")?;
        let (name, field) = path.rsplit_once('.')?;
        self.object_producer(name, field)
    }

    fn consumer(&mut self, recipient: &str) -> Option<Box<dyn Consumer>> {
        if recipient == "log" {
            let mut last = None;
            return Some(Box::new(move |value: i32| {
                if last != Some(value) {
                    info!(value = value, "Operator value changed");
                    last = Some(value);
                }
            }));
        }
        let key = recipient.strip_prefix("record.")?.to_string();
        let records = self.records.clone();
        Some(Box::new(move |value: i32| {
            records.borrow_mut().insert(key.clone(), value);
        }))
    }
}
