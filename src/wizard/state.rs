use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ServiceError;
use crate::models::{
    AddressPoint, CargoDetails, LocationStep, PaymentMethod, RouteEstimate, ScheduleDetails,
    TruckType,
};
use crate::services::routing::RouteEstimator;

/// Active step of the quote wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "step", rename_all = "snake_case")]
pub enum WizardStage {
    Location(LocationStep),
    TruckSelection,
    Details,
}

impl fmt::Display for WizardStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WizardStage::Location(step) => write!(f, "location({})", step),
            WizardStage::TruckSelection => f.write_str("truck_selection"),
            WizardStage::Details => f.write_str("details"),
        }
    }
}

/// Identifies one in-flight location resolution. Only a token matching the
/// current generation and stage may write its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestToken {
    pub generation: u64,
    pub step: LocationStep,
}

/// Result of `back`.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Continue(WizardState),
    Exit,
}

/// Snapshot of one quoting session.
///
/// Every transition returns a new value and leaves `self` untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WizardState {
    stage: WizardStage,
    pickup: AddressPoint,
    destination: AddressPoint,
    route: Option<RouteEstimate>,
    selected_truck_type: Option<TruckType>,
    cargo: CargoDetails,
    schedule: ScheduleDetails,
    payment_method: PaymentMethod,
    notes: String,
    #[serde(skip)]
    generation: u64,
}

impl WizardState {
    pub fn new(schedule: ScheduleDetails) -> Self {
        Self {
            stage: WizardStage::Location(LocationStep::Origin),
            pickup: AddressPoint::default(),
            destination: AddressPoint::default(),
            route: None,
            selected_truck_type: None,
            cargo: CargoDetails::default(),
            schedule: schedule.with_travel_eta(0),
            payment_method: PaymentMethod::default(),
            notes: String::new(),
            generation: 0,
        }
    }

    pub fn stage(&self) -> WizardStage {
        self.stage
    }

    pub fn pickup(&self) -> &AddressPoint {
        &self.pickup
    }

    pub fn destination(&self) -> &AddressPoint {
        &self.destination
    }

    pub fn point(&self, step: LocationStep) -> &AddressPoint {
        match step {
            LocationStep::Origin => &self.pickup,
            LocationStep::Destination => &self.destination,
        }
    }

    pub fn route(&self) -> Option<RouteEstimate> {
        self.route
    }

    pub fn selected_truck_type(&self) -> Option<TruckType> {
        self.selected_truck_type
    }

    pub fn cargo(&self) -> &CargoDetails {
        &self.cargo
    }

    pub fn schedule(&self) -> &ScheduleDetails {
        &self.schedule
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The point the location stage is currently collecting.
    pub fn active_step(&self) -> Option<LocationStep> {
        match self.stage {
            WizardStage::Location(step) => Some(step),
            _ => None,
        }
    }

    /// Starts a resolution for the active point and supersedes any
    /// resolution already in flight. With `raw_text` the point is reset to
    /// the newly typed, unresolved text.
    pub fn begin_resolution(
        &self,
        raw_text: Option<&str>,
    ) -> Result<(Self, RequestToken), ServiceError> {
        let step = self.active_step().ok_or_else(|| {
            ServiceError::InvalidTransition(format!("No location is being entered in {}", self.stage))
        })?;

        let mut next = self.clone();
        next.generation += 1;
        if let Some(text) = raw_text {
            *next.point_mut(step) = AddressPoint::unresolved(text.trim());
        }
        let token = RequestToken {
            generation: next.generation,
            step,
        };
        Ok((next, token))
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        token.generation == self.generation && self.stage == WizardStage::Location(token.step)
    }

    /// Applies a finished resolution, or `None` when it has been superseded.
    pub fn apply_resolution(&self, token: RequestToken, point: AddressPoint) -> Option<Self> {
        if !self.is_current(token) {
            return None;
        }
        let mut next = self.clone();
        *next.point_mut(token.step) = point;
        Some(next)
    }

    pub fn confirm_origin(&self) -> Result<Self, ServiceError> {
        self.expect_stage(WizardStage::Location(LocationStep::Origin), "confirm the pickup")?;
        if !self.pickup.is_resolved() {
            return Err(ServiceError::InvalidTransition(
                "Pick a pickup location before continuing".to_string(),
            ));
        }
        Ok(self.moved_to(WizardStage::Location(LocationStep::Destination)))
    }

    /// Confirms the destination and computes the route estimate.
    pub fn confirm_destination(&self) -> Result<Self, ServiceError> {
        self.expect_stage(
            WizardStage::Location(LocationStep::Destination),
            "confirm the destination",
        )?;
        let (Some(origin), Some(destination)) = (self.pickup.coordinate, self.destination.coordinate)
        else {
            return Err(ServiceError::InvalidTransition(
                "Pick a destination before continuing".to_string(),
            ));
        };

        let route = RouteEstimator::estimate(origin, destination);
        let mut next = self.moved_to(WizardStage::TruckSelection);
        next.route = Some(route);
        next.schedule = next.schedule.with_travel_eta(route.eta_minutes);
        Ok(next)
    }

    pub fn select_truck(&self, truck_type: TruckType) -> Result<Self, ServiceError> {
        self.expect_stage(WizardStage::TruckSelection, "select a truck")?;
        let mut next = self.clone();
        next.selected_truck_type = Some(truck_type);
        Ok(next)
    }

    pub fn proceed_to_details(&self) -> Result<Self, ServiceError> {
        self.expect_stage(WizardStage::TruckSelection, "continue to details")?;
        if self.selected_truck_type.is_none() {
            return Err(ServiceError::InvalidTransition(
                "Select a truck type before continuing".to_string(),
            ));
        }
        Ok(self.moved_to(WizardStage::Details))
    }

    pub fn back(&self) -> Transition {
        match self.stage {
            WizardStage::Details => Transition::Continue(self.moved_to(WizardStage::TruckSelection)),
            WizardStage::TruckSelection => {
                let mut next = self.moved_to(WizardStage::Location(LocationStep::Destination));
                next.destination = AddressPoint::default();
                next.route = None;
                next.schedule = next.schedule.with_travel_eta(0);
                Transition::Continue(next)
            }
            WizardStage::Location(LocationStep::Destination) => {
                Transition::Continue(self.moved_to(WizardStage::Location(LocationStep::Origin)))
            }
            WizardStage::Location(LocationStep::Origin) => Transition::Exit,
        }
    }

    pub fn with_cargo(&self, cargo: CargoDetails) -> Result<Self, ServiceError> {
        self.edit_details(|next| next.cargo = cargo)
    }

    pub fn with_request_date(&self, date: Option<NaiveDate>) -> Result<Self, ServiceError> {
        self.edit_details(|next| next.schedule = next.schedule.clone().with_request_date(date))
    }

    pub fn with_delivery_date(&self, date: Option<NaiveDate>) -> Result<Self, ServiceError> {
        self.edit_details(|next| next.schedule = next.schedule.clone().with_delivery_date(date))
    }

    /// Updates the departure time; the arrival time is re-derived.
    pub fn with_departure_time(&self, departure_time: &str) -> Result<Self, ServiceError> {
        self.edit_details(|next| {
            next.schedule = next.schedule.clone().with_departure_time(departure_time.trim())
        })
    }

    pub fn with_payment_method(&self, method: PaymentMethod) -> Result<Self, ServiceError> {
        self.edit_details(|next| next.payment_method = method)
    }

    pub fn with_notes(&self, notes: &str) -> Result<Self, ServiceError> {
        self.edit_details(|next| next.notes = notes.to_string())
    }

    fn edit_details(&self, edit: impl FnOnce(&mut Self)) -> Result<Self, ServiceError> {
        self.expect_stage(WizardStage::Details, "edit quote details")?;
        let mut next = self.clone();
        edit(&mut next);
        Ok(next)
    }

    fn expect_stage(&self, expected: WizardStage, action: &str) -> Result<(), ServiceError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(ServiceError::InvalidTransition(format!(
                "Cannot {} while in {}",
                action, self.stage
            )))
        }
    }

    // Stage changes invalidate every resolution still in flight.
    fn moved_to(&self, stage: WizardStage) -> Self {
        let mut next = self.clone();
        next.stage = stage;
        next.generation += 1;
        next
    }

    fn point_mut(&mut self, step: LocationStep) -> &mut AddressPoint {
        match step {
            LocationStep::Origin => &mut self.pickup,
            LocationStep::Destination => &mut self.destination,
        }
    }
}
