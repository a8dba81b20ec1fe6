//! Application (invoice request) flow state machine.
//!
//! `step` is pure: it mutates the conversation state and returns the effects the
//! caller must carry out (prompts, notices, relays, registry lookup, submission).

use super::entities::CompanyData;
use super::money::parse_money;
use super::org_name::names_match;
use super::support_interrupt;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Idle,
    ChooseCompany,
    AwaitTaxId,
    AwaitLegalName,
    AwaitItemName,
    AwaitItemQty,
    AwaitItemUnit,
    AwaitItemUnitPrice,
    AwaitItemLineTotal,
    AskMoreItems,
    AwaitContract,
    SupportQuestion,
    AwaitContinue,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    /// Free text; empty means the default unit.
    pub unit: String,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub company: String,
    pub tax_id: String,
    /// Legal name as typed by the user.
    pub legal_name: String,
    /// Contract reference; "0" when skipped.
    pub contract: String,
    pub items: Vec<LineItem>,
    pub registry: CompanyData,
    pub registry_error: Option<String>,
}

impl Draft {
    pub fn total(&self) -> Decimal {
        self.items.iter().map(|i| i.line_total).sum()
    }

    /// Registry name when known, otherwise what the user typed.
    pub fn payer_name(&self) -> &str {
        let official = self.registry.name.trim();
        if official.is_empty() {
            self.legal_name.trim()
        } else {
            official
        }
    }

    pub fn apply_registry(&mut self, result: Result<CompanyData, String>) {
        match result {
            Ok(data) => {
                self.registry = data;
                self.registry_error = None;
            }
            Err(e) => {
                self.registry = CompanyData::default();
                self.registry_error = Some(e);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    pub stage: Stage,
    /// Stage to resume after a support question; set only while interrupted.
    pub return_stage: Option<Stage>,
    pub draft: Draft,
    pub current_item: LineItem,
}

impl ConversationState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Control buttons recognised by the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    StartApplication,
    Cancel,
    Support,
    Skip,
    Continue,
    AddItem,
    Finish,
}

/// One inbound private message as the flow sees it.
#[derive(Debug, Clone, Copy)]
pub struct FlowInput<'a> {
    /// Trimmed text; empty for media.
    pub text: &'a str,
    pub control: Option<Control>,
    /// Text, document or photo present.
    pub has_content: bool,
}

/// Validation and status messages, rendered by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    PickCompany,
    BadQuantity,
    BadPrice,
    BadTotal,
    NameMismatch {
        tax_id: String,
        official: String,
    },
    TotalMismatch {
        quantity: u32,
        unit_price: Decimal,
        expected: Decimal,
        entered: Decimal,
    },
    ReenterPriceAndTotal,
    PickOption,
    SupportEmpty,
    SupportQueued,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Issue the prompt of the (new) current stage.
    Prompt,
    Reply(Notice),
    /// Look up `draft.tax_id` and store the result with `Draft::apply_registry`.
    LookupRegistry,
    /// Relay the message to the navigator and tag it as a support question.
    RelaySupport,
    /// Relay the message to the navigator as ordinary correspondence.
    RelayPlain,
    Submit(Box<Draft>),
    Cancelled,
}

/// Advances the flow by one inbound message.
pub fn step(state: &mut ConversationState, input: FlowInput<'_>, companies: &[String]) -> Vec<Effect> {
    if state.stage == Stage::AwaitContinue {
        return match input.control {
            Some(Control::Cancel) => {
                state.reset();
                vec![Effect::Cancelled]
            }
            Some(Control::Continue) => {
                support_interrupt::resume(state);
                vec![Effect::Prompt]
            }
            _ if input.has_content => vec![Effect::RelaySupport],
            _ => Vec::new(),
        };
    }

    if state.stage != Stage::Idle {
        match input.control {
            Some(Control::Cancel) => {
                state.reset();
                return vec![Effect::Cancelled];
            }
            Some(Control::Support) => {
                support_interrupt::begin(state);
                return vec![Effect::Prompt];
            }
            _ => {}
        }
    }

    let text = input.text;
    match state.stage {
        Stage::Idle => {
            if input.control == Some(Control::StartApplication) {
                state.reset();
                state.stage = Stage::ChooseCompany;
                vec![Effect::Prompt]
            } else {
                vec![Effect::RelayPlain]
            }
        }

        Stage::SupportQuestion => {
            if !input.has_content {
                return vec![Effect::Reply(Notice::SupportEmpty)];
            }
            state.stage = Stage::AwaitContinue;
            vec![Effect::RelaySupport, Effect::Reply(Notice::SupportQueued)]
        }

        Stage::ChooseCompany => match companies.iter().find(|c| c.as_str() == text) {
            Some(company) => {
                state.draft.company = company.clone();
                state.stage = Stage::AwaitTaxId;
                vec![Effect::Prompt]
            }
            None => vec![Effect::Reply(Notice::PickCompany)],
        },

        Stage::AwaitTaxId => {
            if text.is_empty() {
                return vec![Effect::Prompt];
            }
            state.draft.tax_id = text.to_string();
            state.stage = Stage::AwaitLegalName;
            vec![Effect::LookupRegistry, Effect::Prompt]
        }

        Stage::AwaitLegalName => {
            if text.is_empty() {
                return vec![Effect::Prompt];
            }
            let official = state.draft.registry.name.trim();
            if !official.is_empty() && !names_match(text, official) {
                return vec![Effect::Reply(Notice::NameMismatch {
                    tax_id: state.draft.tax_id.clone(),
                    official: official.to_string(),
                })];
            }
            state.draft.legal_name = text.to_string();
            state.current_item = LineItem::default();
            state.stage = Stage::AwaitItemName;
            vec![Effect::Prompt]
        }

        Stage::AwaitItemName => {
            if text.is_empty() {
                return vec![Effect::Prompt];
            }
            state.current_item = LineItem {
                name: text.to_string(),
                quantity: 1,
                ..LineItem::default()
            };
            state.stage = Stage::AwaitItemQty;
            vec![Effect::Prompt]
        }

        Stage::AwaitItemQty => {
            if input.control == Some(Control::Skip) {
                state.current_item.quantity = 1;
                state.stage = Stage::AwaitItemUnit;
                return vec![Effect::Prompt];
            }
            if text.is_empty() {
                return vec![Effect::Prompt];
            }
            match text.parse::<u32>() {
                Ok(q) if q > 0 => {
                    state.current_item.quantity = q;
                    state.stage = Stage::AwaitItemUnit;
                    vec![Effect::Prompt]
                }
                _ => vec![Effect::Reply(Notice::BadQuantity)],
            }
        }

        Stage::AwaitItemUnit => {
            state.current_item.unit = if input.control == Some(Control::Skip) {
                String::new()
            } else {
                text.to_string()
            };
            state.stage = if state.current_item.quantity == 1 {
                Stage::AwaitItemLineTotal
            } else {
                Stage::AwaitItemUnitPrice
            };
            vec![Effect::Prompt]
        }

        Stage::AwaitItemUnitPrice => {
            if text.is_empty() {
                return vec![Effect::Prompt];
            }
            match parse_money(text) {
                Some(price) => {
                    state.current_item.unit_price = price;
                    state.stage = Stage::AwaitItemLineTotal;
                    vec![Effect::Prompt]
                }
                None => vec![Effect::Reply(Notice::BadPrice)],
            }
        }

        Stage::AwaitItemLineTotal => {
            if text.is_empty() {
                return vec![Effect::Prompt];
            }
            let Some(total) = parse_money(text) else {
                return vec![Effect::Reply(Notice::BadTotal)];
            };
            let item = &mut state.current_item;
            if item.quantity == 1 {
                item.unit_price = total;
            } else {
                let expected = Decimal::from(item.quantity) * item.unit_price;
                if expected != total {
                    let notice = Notice::TotalMismatch {
                        quantity: item.quantity,
                        unit_price: item.unit_price,
                        expected,
                        entered: total,
                    };
                    item.line_total = Decimal::ZERO;
                    state.stage = Stage::AwaitItemUnitPrice;
                    return vec![
                        Effect::Reply(notice),
                        Effect::Reply(Notice::ReenterPriceAndTotal),
                    ];
                }
            }
            item.line_total = total;
            let committed = std::mem::take(&mut state.current_item);
            state.draft.items.push(committed);
            state.stage = Stage::AskMoreItems;
            vec![Effect::Prompt]
        }

        Stage::AskMoreItems => match input.control {
            Some(Control::AddItem) => {
                state.stage = Stage::AwaitItemName;
                vec![Effect::Prompt]
            }
            Some(Control::Finish) => {
                state.stage = if state.draft.items.is_empty() {
                    Stage::AwaitItemName
                } else {
                    Stage::AwaitContract
                };
                vec![Effect::Prompt]
            }
            _ => vec![Effect::Reply(Notice::PickOption)],
        },

        Stage::AwaitContract => {
            let contract = if input.control == Some(Control::Skip) {
                "0".to_string()
            } else if text.is_empty() {
                return vec![Effect::Prompt];
            } else {
                text.to_string()
            };
            state.draft.contract = contract;
            let draft = std::mem::take(&mut state.draft);
            state.reset();
            vec![Effect::Submit(Box::new(draft))]
        }

        // Handled before the match.
        Stage::AwaitContinue => Vec::new(),
    }
}
