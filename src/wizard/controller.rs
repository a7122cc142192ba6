use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::config::ScheduleConfig;
use crate::errors::ServiceError;
use crate::events::{EventSender, WizardEvent};
use crate::map_bridge::MapEvent;
use crate::models::{
    AddressPoint, CargoDetails, Coordinate, LocationStep, PaymentMethod, ScheduleDetails, TruckType,
};
use crate::services::location::LocationResolver;
use crate::services::quotes::{QuoteAssembler, SubmissionOutcome};
use crate::wizard::state::{RequestToken, Transition, WizardStage, WizardState};

/// Drives one quoting session and is the only writer of its [`WizardState`].
pub struct WizardController {
    state: RwLock<WizardState>,
    resolver: LocationResolver,
    assembler: QuoteAssembler,
    events: Option<EventSender>,
    client_id: String,
}

impl WizardController {
    pub fn new(
        resolver: LocationResolver,
        assembler: QuoteAssembler,
        client_id: impl Into<String>,
        schedule: &ScheduleConfig,
    ) -> Self {
        Self {
            state: RwLock::new(WizardState::new(ScheduleDetails::new(
                schedule.default_departure_time.as_str(),
            ))),
            resolver,
            assembler,
            events: None,
            client_id: client_id.into(),
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Current snapshot.
    pub async fn state(&self) -> WizardState {
        self.state.read().await.clone()
    }

    pub async fn stage(&self) -> WizardStage {
        self.state.read().await.stage()
    }

    /// Waits for the map surface handshake and flushes queued messages.
    pub async fn attach_map(&self) -> bool {
        self.resolver.bridge().wait_until_ready().await
    }

    /// Geocodes typed text for the point being entered.
    ///
    /// `Ok(None)` means the lookup, successful or failed, finished after newer
    /// input or a stage change and was dropped.
    #[instrument(skip(self))]
    pub async fn resolve_address(&self, text: &str) -> Result<Option<AddressPoint>, ServiceError> {
        let token = self.begin_address_resolution(Some(text)).await?;
        match self.resolver.locate_address(text).await {
            Ok(point) => Ok(self.complete_resolution(token, point).await),
            Err(e) => self.fail_resolution(token, e).await,
        }
    }

    /// Dispatches a raw message from the map surface.
    pub async fn handle_map_message(&self, raw: &str) -> Result<Option<AddressPoint>, ServiceError> {
        match self.resolver.bridge().receive(raw).await {
            Some(MapEvent::Click(coordinate)) => self.handle_map_click(coordinate).await,
            Some(MapEvent::Ready) | None => Ok(None),
        }
    }

    /// Applies a tapped point to the active location step. Taps outside the
    /// location stage are ignored.
    #[instrument(skip(self))]
    pub async fn handle_map_click(
        &self,
        coordinate: Coordinate,
    ) -> Result<Option<AddressPoint>, ServiceError> {
        if self.state.read().await.active_step().is_none() {
            debug!("Ignoring map click outside the location stage");
            return Ok(None);
        }
        let token = self.begin_address_resolution(None).await?;
        let point = self.resolver.resolve_tapped_point(coordinate).await;
        Ok(self.complete_resolution(token, point).await)
    }

    /// Fills the active point from the device position.
    #[instrument(skip(self))]
    pub async fn use_current_location(&self) -> Result<Option<AddressPoint>, ServiceError> {
        let token = self.begin_address_resolution(None).await?;
        let point = match self.resolver.resolve_current_device_position().await {
            Ok(point) => point,
            Err(e) => return self.fail_resolution(token, e).await,
        };
        let applied = self.complete_resolution(token, point).await;
        if let Some(coordinate) = applied.as_ref().and_then(|p| p.coordinate) {
            self.resolver.bridge().update_current_location(coordinate).await;
        }
        Ok(applied)
    }

    /// Registers a new resolution for the active point, superseding any
    /// that is still running.
    pub async fn begin_address_resolution(
        &self,
        raw_text: Option<&str>,
    ) -> Result<RequestToken, ServiceError> {
        let mut state = self.state.write().await;
        let (next, token) = state.begin_resolution(raw_text)?;
        *state = next;
        Ok(token)
    }

    /// Stores a finished resolution if its token is still current and puts
    /// the marker on the map.
    pub async fn complete_resolution(
        &self,
        token: RequestToken,
        point: AddressPoint,
    ) -> Option<AddressPoint> {
        let mut state = self.state.write().await;
        match state.apply_resolution(token, point.clone()) {
            Some(next) => *state = next,
            None => {
                warn!(
                    step = %token.step,
                    generation = token.generation,
                    current = state.generation(),
                    "Discarding stale location result"
                );
                return None;
            }
        }
        // Held until the marker is queued so a concurrent `back` cannot
        // clear it first.
        self.resolver.show_on_map(token.step, &point).await;
        drop(state);

        self.publish(WizardEvent::AddressResolved {
            step: token.step,
            point: point.clone(),
        });
        Some(point)
    }

    /// Reports a failed resolution only while it is still the current one.
    async fn fail_resolution(
        &self,
        token: RequestToken,
        err: ServiceError,
    ) -> Result<Option<AddressPoint>, ServiceError> {
        if self.state.read().await.is_current(token) {
            return Err(err);
        }
        warn!(
            step = %token.step,
            generation = token.generation,
            "Discarding failure of a superseded location lookup: {}",
            err
        );
        Ok(None)
    }

    pub async fn confirm_origin(&self) -> Result<WizardStage, ServiceError> {
        self.transition(WizardState::confirm_origin).await
    }

    pub async fn confirm_destination(&self) -> Result<WizardStage, ServiceError> {
        let stage = self.transition(WizardState::confirm_destination).await?;
        if let Some(route) = self.state.read().await.route() {
            info!(
                distance_km = route.distance_km,
                eta_minutes = route.eta_minutes,
                "Route estimated"
            );
            self.publish(WizardEvent::RouteEstimated(route));
        }
        Ok(stage)
    }

    pub async fn select_truck(&self, truck_type: TruckType) -> Result<WizardStage, ServiceError> {
        self.transition(|state| state.select_truck(truck_type)).await
    }

    pub async fn proceed_to_details(&self) -> Result<WizardStage, ServiceError> {
        self.transition(WizardState::proceed_to_details).await
    }

    pub async fn set_cargo(&self, cargo: CargoDetails) -> Result<(), ServiceError> {
        self.transition(|state| state.with_cargo(cargo)).await.map(|_| ())
    }

    pub async fn set_request_date(&self, date: Option<NaiveDate>) -> Result<(), ServiceError> {
        self.transition(|state| state.with_request_date(date)).await.map(|_| ())
    }

    pub async fn set_delivery_date(&self, date: Option<NaiveDate>) -> Result<(), ServiceError> {
        self.transition(|state| state.with_delivery_date(date)).await.map(|_| ())
    }

    pub async fn set_departure_time(&self, departure_time: &str) -> Result<(), ServiceError> {
        self.transition(|state| state.with_departure_time(departure_time))
            .await
            .map(|_| ())
    }

    pub async fn set_payment_method(&self, method: PaymentMethod) -> Result<(), ServiceError> {
        self.transition(|state| state.with_payment_method(method))
            .await
            .map(|_| ())
    }

    pub async fn set_notes(&self, notes: &str) -> Result<(), ServiceError> {
        self.transition(|state| state.with_notes(notes)).await.map(|_| ())
    }

    /// Steps back. `None` means the user left the wizard.
    pub async fn back(&self) -> Option<WizardStage> {
        let mut state = self.state.write().await;
        let from = state.stage();
        match state.back() {
            Transition::Continue(next) => {
                let to = next.stage();
                *state = next;
                drop(state);

                if from == WizardStage::TruckSelection {
                    self.resolver.bridge().clear_marker(LocationStep::Destination).await;
                }
                info!(%from, %to, "Wizard stage changed");
                self.publish(WizardEvent::StageChanged { from, to });
                Some(to)
            }
            Transition::Exit => {
                info!("Wizard exited");
                self.publish(WizardEvent::Exited);
                None
            }
        }
    }

    /// Validates, assembles and sends the quote. On failure the wizard state
    /// is kept so the user can correct it and retry.
    #[instrument(skip(self), fields(client_id = %self.client_id))]
    pub async fn submit(&self) -> Result<SubmissionOutcome, ServiceError> {
        let snapshot = self.state().await;
        if snapshot.stage() != WizardStage::Details {
            return Err(ServiceError::InvalidTransition(format!(
                "Cannot submit while in {}",
                snapshot.stage()
            )));
        }

        let request = self.assembler.build_quote_request(&snapshot, &self.client_id)?;
        let outcome = self.assembler.submit(request).await?;
        self.publish(WizardEvent::QuoteSubmitted {
            quote_id: outcome.quote.id.clone(),
            first_quote: outcome.first_quote,
        });
        Ok(outcome)
    }

    async fn transition<F>(&self, apply: F) -> Result<WizardStage, ServiceError>
    where
        F: FnOnce(&WizardState) -> Result<WizardState, ServiceError>,
    {
        let mut state = self.state.write().await;
        let from = state.stage();
        let next = apply(&*state)?;
        let to = next.stage();
        *state = next;
        drop(state);

        if from != to {
            info!(%from, %to, "Wizard stage changed");
            self.publish(WizardEvent::StageChanged { from, to });
        }
        Ok(to)
    }

    fn publish(&self, event: WizardEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}
