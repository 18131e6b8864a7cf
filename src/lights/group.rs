use crate::action::ChannelTargets;
use crate::color::{Color, Paint};

use super::Fixture;

/// Fixtures driven as one. Later members win where channels overlap.
#[derive(Default)]
pub struct Group<'a> {
    fixtures: Vec<&'a dyn Fixture>,
}

impl<'a> Group<'a> {
    pub fn new(fixtures: impl IntoIterator<Item = &'a dyn Fixture>) -> Self {
        Self { fixtures: fixtures.into_iter().collect() }
    }

    pub fn with(mut self, fixture: &'a dyn Fixture) -> Self {
        self.fixtures.push(fixture);
        self
    }
}

impl Fixture for Group<'_> {
    fn targets(&self, color: Color, paint: Paint) -> ChannelTargets {
        let mut targets = ChannelTargets::new();
        for fixture in &self.fixtures {
            targets.extend(fixture.targets(color, paint));
        }
        targets
    }
}
