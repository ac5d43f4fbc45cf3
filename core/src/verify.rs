//! Post-deployment checks.
//!
//! A [`DeploymentExpectation`] recomputes the token address from public inputs
//! alone; the [`Verifier`] then runs every [`VerificationRule`] against the
//! committed ledger state and the deployment receipt.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::encoding::{EncodingError, TokenArgs};
use crate::events::{PairCreated, Receipt, TokenCreated};
use crate::factory::DeploymentFactory;
use crate::ledger::{Storage, WorldState};
use crate::oracle::{AddressOracle, StateReader};
use crate::registry::PairRegistry;
use crate::token::TokenTemplate;

// ── Types ─────────────────────────────────────────────────────────────────────

/// Everything an outside observer knows before the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentExpectation {
    pub factory: Address,
    pub registry: Address,
    pub reference_asset: Address,
    pub template: TokenTemplate,
    pub name: String,
    pub symbol: String,
    pub total_supply: U256,
    pub originator: Address,
}

impl DeploymentExpectation {
    /// Expectation for a call to `factory`, using its published addresses
    /// and template.
    pub fn for_factory<R: PairRegistry>(
        factory: &DeploymentFactory<R>,
        name: &str,
        symbol: &str,
        total_supply: U256,
        originator: Address,
    ) -> Self {
        Self {
            factory: factory.address(),
            registry: factory.registry().address(),
            reference_asset: factory.config().reference_asset,
            template: factory.config().template.clone(),
            name: name.to_string(),
            symbol: symbol.to_string(),
            total_supply,
            originator,
        }
    }

    pub fn salt(&self) -> Result<B256, EncodingError> {
        AddressOracle::derive_salt(&self.name)
    }

    /// Recompute the token address. Touches no state.
    pub fn predict(&self) -> Result<Address, EncodingError> {
        let args = TokenArgs::new(
            self.name.as_str(),
            self.symbol.as_str(),
            self.total_supply,
            self.originator,
        );
        let init_code = self.template.init_code(&args)?;
        Ok(AddressOracle::predict(self.factory, self.salt()?, &init_code))
    }
}

/// What a rule gets to look at.
pub struct VerificationContext<'a> {
    pub expectation: &'a DeploymentExpectation,
    pub predicted: Address,
    pub state: &'a WorldState,
    pub receipt: &'a Receipt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub predicted: Address,
    pub violations: Vec<Violation>,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violated(&self, rule: &str) -> bool {
        self.violations.iter().any(|v| v.rule == rule)
    }
}

// ── Rule trait ────────────────────────────────────────────────────────────────

pub trait VerificationRule: Send + Sync {
    fn name(&self) -> &str;

    /// Zero violations means the rule holds.
    fn check(&self, ctx: &VerificationContext<'_>) -> Vec<Violation>;
}

fn violation(rule: &dyn VerificationRule, message: String) -> Violation {
    Violation {
        rule: rule.name().to_string(),
        message,
    }
}

// ── Built-in rules ────────────────────────────────────────────────────────────

/// Code sits at the predicted address.
pub struct CodePresenceRule;

impl VerificationRule for CodePresenceRule {
    fn name(&self) -> &str {
        "code_presence"
    }

    fn check(&self, ctx: &VerificationContext<'_>) -> Vec<Violation> {
        if ctx.state.has_code(ctx.predicted) {
            Vec::new()
        } else {
            vec![violation(
                self,
                format!("No code at predicted address {}", ctx.predicted),
            )]
        }
    }
}

/// The factory emitted exactly one `TokenCreated`, naming the predicted address.
pub struct TokenCreatedRule;

impl VerificationRule for TokenCreatedRule {
    fn name(&self) -> &str {
        "token_created"
    }

    fn check(&self, ctx: &VerificationContext<'_>) -> Vec<Violation> {
        let events: Vec<TokenCreated> = ctx
            .receipt
            .events::<TokenCreated>(ctx.expectation.factory)
            .collect();

        match events.as_slice() {
            [] => vec![violation(
                self,
                format!("Factory {} emitted no TokenCreated", ctx.expectation.factory),
            )],
            [event] if event.tokenAddress == ctx.predicted => Vec::new(),
            [event] => vec![violation(
                self,
                format!(
                    "TokenCreated names {} but {} was predicted",
                    event.tokenAddress, ctx.predicted
                ),
            )],
            many => vec![violation(
                self,
                format!("Factory emitted {} TokenCreated events", many.len()),
            )],
        }
    }
}

/// Total supply and the originator's balance both equal the requested supply,
/// and nobody else holds any.
pub struct SupplyAllocationRule;

impl VerificationRule for SupplyAllocationRule {
    fn name(&self) -> &str {
        "supply_allocation"
    }

    fn check(&self, ctx: &VerificationContext<'_>) -> Vec<Violation> {
        let expected = ctx.expectation.total_supply;
        let originator = ctx.expectation.originator;

        let token = match ctx.state.token(ctx.predicted) {
            Ok(token) => token,
            Err(e) => return vec![violation(self, format!("Token unreadable: {e}"))],
        };

        let mut out = Vec::new();
        if token.total_supply != expected {
            out.push(violation(
                self,
                format!("Total supply is {} instead of {}", token.total_supply, expected),
            ));
        }
        if token.balance_of(originator) != expected {
            out.push(violation(
                self,
                format!(
                    "Originator {} holds {} instead of {}",
                    originator,
                    token.balance_of(originator),
                    expected
                ),
            ));
        }
        for (holder, balance) in token.holders().filter(|(h, _)| *h != originator) {
            out.push(violation(
                self,
                format!("Unexpected holder {holder} with balance {balance}"),
            ));
        }
        out
    }
}

/// The registry emitted `PairCreated` with `token0 < token1`, pairing the new
/// token with the reference asset at an address that holds code.
pub struct PairOrderingRule;

impl VerificationRule for PairOrderingRule {
    fn name(&self) -> &str {
        "pair_ordering"
    }

    fn check(&self, ctx: &VerificationContext<'_>) -> Vec<Violation> {
        let registry = ctx.expectation.registry;
        let Some(event) = ctx.receipt.event::<PairCreated>(registry) else {
            return vec![violation(
                self,
                format!("Registry {registry} emitted no PairCreated"),
            )];
        };

        let mut out = Vec::new();
        if event.token0 >= event.token1 {
            out.push(violation(
                self,
                format!("Pair tokens out of order: {} >= {}", event.token0, event.token1),
            ));
        }
        for token in [ctx.predicted, ctx.expectation.reference_asset] {
            if event.token0 != token && event.token1 != token {
                out.push(violation(self, format!("Pair does not contain {token}")));
            }
        }
        if !ctx.state.has_code(event.pair) {
            out.push(violation(self, format!("No code at pair {}", event.pair)));
        }
        out
    }
}

/// The factory's book holds a record for the salt matching every input.
pub struct DeploymentRecordRule;

impl VerificationRule for DeploymentRecordRule {
    fn name(&self) -> &str {
        "deployment_record"
    }

    fn check(&self, ctx: &VerificationContext<'_>) -> Vec<Violation> {
        let expectation = ctx.expectation;
        let book = match ctx.state.storage(expectation.factory) {
            Ok(Storage::Factory(book)) => book,
            Ok(_) => {
                return vec![violation(
                    self,
                    format!("{} is not a deployment factory", expectation.factory),
                )]
            }
            Err(e) => return vec![violation(self, format!("Factory unreadable: {e}"))],
        };

        let salt = match expectation.salt() {
            Ok(salt) => salt,
            Err(e) => return vec![violation(self, format!("Salt underivable: {e}"))],
        };
        let Some(record) = book.get(&salt) else {
            return vec![violation(self, format!("No record for salt {salt}"))];
        };

        let mut mismatches = Vec::new();
        if record.token_address != ctx.predicted {
            mismatches.push("token_address");
        }
        if record.name != expectation.name {
            mismatches.push("name");
        }
        if record.symbol != expectation.symbol {
            mismatches.push("symbol");
        }
        if record.total_supply != expectation.total_supply {
            mismatches.push("total_supply");
        }
        if record.creator != expectation.originator {
            mismatches.push("creator");
        }
        mismatches
            .into_iter()
            .map(|field| violation(self, format!("Record field {field} does not match")))
            .collect()
    }
}

// ── Verifier ──────────────────────────────────────────────────────────────────

pub struct Verifier {
    rules: Vec<Box<dyn VerificationRule>>,
}

impl Verifier {
    /// A verifier with every built-in rule.
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(CodePresenceRule),
                Box::new(TokenCreatedRule),
                Box::new(SupplyAllocationRule),
                Box::new(PairOrderingRule),
                Box::new(DeploymentRecordRule),
            ],
        }
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn VerificationRule>) {
        self.rules.push(rule);
    }

    pub fn verify(
        &self,
        expectation: &DeploymentExpectation,
        state: &WorldState,
        receipt: &Receipt,
    ) -> Result<VerificationReport, EncodingError> {
        let predicted = expectation.predict()?;
        let ctx = VerificationContext {
            expectation,
            predicted,
            state,
            receipt,
        };
        let violations: Vec<Violation> = self
            .rules
            .iter()
            .flat_map(|rule| rule.check(&ctx))
            .collect();

        for v in &violations {
            tracing::warn!(rule = %v.rule, predicted = %predicted, "{}", v.message);
        }
        tracing::info!(
            name = %expectation.name,
            predicted = %predicted,
            violations = violations.len(),
            "Deployment verified"
        );

        Ok(VerificationReport {
            predicted,
            violations,
        })
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
