//! Application wiring and tick loop

use anyhow::Result;
use bcilink_core::{CustomVariables, ObjectSource, Remote, Session, StateSender};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::resolver::BuiltinResolver;
use crate::simulation::SimulatedObject;

/// Session plus the scene bound to it
pub struct App {
    pub session: Session,
    senders: Vec<StateSender>,
    objects: Vec<Rc<SimulatedObject>>,
    resolver: BuiltinResolver,
    tick_interval: Duration,
}

impl App {
    /// Declare everything the config describes; nothing is sent yet
    pub fn new(config: &Config, remote: Box<dyn Remote>) -> Result<Self> {
        let mut session = Session::new(remote, config.to_session_config());

        for set in config.to_parameter_sets() {
            session.add_parameter_set(set)?;
        }
        for command in &config.session.post_start_commands {
            session.execute_after_start(command.clone())?;
        }

        let mut resolver = BuiltinResolver::new();
        let mut senders = Vec::new();
        let mut objects = Vec::new();
        for object_config in &config.objects {
            let object = Rc::new(SimulatedObject::from_config(object_config));
            let mut sender = StateSender::new(object_config.name.clone());
            let source: Rc<dyn ObjectSource> = object.clone();
            sender.attach_object(&mut session, source, &object_config.to_states())?;
            resolver.add_object(object.clone());
            objects.push(object);
            senders.push(sender);
        }

        let mut app = Self {
            session,
            senders,
            objects,
            resolver,
            tick_interval: Duration::from_millis(config.session.tick_interval_ms),
        };
        app.bind_custom_variables(config)?;

        info!(
            objects = app.objects.len(),
            senders = app.senders.len(),
            states = app.session.states().len(),
            "Scene declared"
        );
        Ok(app)
    }

    /// Bind `[[custom]]` entries, grouped by object in file order
    fn bind_custom_variables(&mut self, config: &Config) -> Result<()> {
        let mut groups: Vec<(String, CustomVariables)> = Vec::new();
        for custom in &config.custom {
            let index = match groups.iter().position(|(object, _)| *object == custom.object) {
                Some(index) => index,
                None => {
                    groups.push((custom.object.clone(), CustomVariables::new()));
                    groups.len() - 1
                }
            };
            groups[index].1.variables.push(custom.to_descriptor());
        }

        for (object, variables) in groups {
            let index = match self.senders.iter().position(|s| s.object_name() == object) {
                Some(index) => index,
                None => {
                    debug!(object = %object, "Custom variables without a simulated object");
                    self.senders.push(StateSender::new(object.clone()));
                    self.senders.len() - 1
                }
            };
            let bound =
                variables.bind(&mut self.senders[index], &mut self.session, &mut self.resolver)?;
            if bound < variables.len() {
                warn!(
                    object = %object,
                    bound = bound,
                    declared = variables.len(),
                    "Some custom variables were not bound"
                );
            }
        }
        Ok(())
    }

    pub fn bootstrap(&mut self) -> Result<()> {
        self.session.bootstrap()?;
        Ok(())
    }

    /// Advance the scene by `dt` seconds and sync every sender
    pub fn tick(&mut self, dt: f32) -> Result<()> {
        for object in &self.objects {
            object.advance(dt);
        }
        for sender in &mut self.senders {
            sender.tick(&mut self.session)?;
        }
        Ok(())
    }

    /// Tick at the configured interval until `running` clears or `ticks` is reached
    pub fn run(&mut self, ticks: Option<u64>, running: &AtomicBool) -> Result<u64> {
        let dt = self.tick_interval.as_secs_f32();
        let mut count: u64 = 0;

        info!(interval_ms = self.tick_interval.as_millis() as u64, "Tick loop running (Press Ctrl+C to stop)");
        while running.load(Ordering::Relaxed) {
            if ticks.is_some_and(|limit| count >= limit) {
                break;
            }
            self.tick(dt)?;
            count += 1;
            std::thread::sleep(self.tick_interval);
        }
        debug!(ticks = count, "Tick loop finished");
        Ok(count)
    }

    pub fn shutdown(&mut self) {
        self.session.shutdown();
    }
}
