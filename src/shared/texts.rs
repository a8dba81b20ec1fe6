//! User-facing copy: button labels, prompts, notices and keyboards.

use crate::domain::{ConversationState, Control, Draft, Notice, Stage, UserProfile};
use crate::ports::{InlineButton, Keyboard};

pub const BTN_MAKE_APPLICATION: &str = "📝 Составить заявку";
pub const BTN_CANCEL: &str = "❌ Отмена";
pub const BTN_SUPPORT: &str = "🆘 Поддержка";
pub const BTN_SKIP: &str = "⏭ Пропуск";
pub const BTN_CONTINUE: &str = "▶️ Продолжить";
pub const BTN_ADD_ITEM: &str = "➕ Добавить позицию";
pub const BTN_FINISH_ITEMS: &str = "✅ Готово";

pub const BTN_BROADCAST: &str = "📨 Рассылка";
pub const BTN_DIRECT: &str = "✉️ Написать";

pub const BTN_APPROVE: &str = "✅ Подтвердить";
pub const BTN_REVISE: &str = "✍️ Правка";

pub const CB_BROADCAST_SEND_NOW: &str = "broadcast_send_now";
pub const CB_BROADCAST_SCHEDULE: &str = "broadcast_schedule";
pub const CB_BROADCAST_CANCEL: &str = "broadcast_cancel";

pub const START_TEXT: &str = "Привет! 👋
Я успешно связал Вас с командой поддержки.

Как только сотрудники увидят Ваше сообщение,
они обязательно Вам ответят.

Вы можете написать свой вопрос прямо сейчас.";

pub const ACCESS_GRANTED: &str = "Принято, можете писать нашей команде";
pub const CATEGORY_PICKER: &str =
    "Перед отправкой документов выберите, по какой компании вы хотите их отправить";
pub const CATEGORY_CHAT_MISSING: &str =
    "Ошибка: не настроен chat_id бухгалтерии для выбранной компании.";
pub const APPLICATION_CANCELLED: &str = "Заявка отменена.";
pub const APPLICATION_SUBMITTED: &str = "Заявка отправлена на подтверждение ✅";
pub const APPLICATION_ACCEPTED_NO_APPROVAL: &str =
    "Заявка принята. (чат подтверждения не настроен)";
pub const APPLICATION_POST_FAILED: &str = "Не смог отправить счёт на подтверждение.";
pub const SUPPORT_PROMPT: &str = "Напишите свой вопрос:";

/// Caption limit for documents and photos.
pub const CAPTION_LIMIT: usize = 1024;

/// Exact button labels map to flow controls.
pub fn control_from_label(text: &str) -> Option<Control> {
    match text.trim() {
        BTN_MAKE_APPLICATION => Some(Control::StartApplication),
        BTN_CANCEL => Some(Control::Cancel),
        BTN_SUPPORT => Some(Control::Support),
        BTN_SKIP => Some(Control::Skip),
        BTN_CONTINUE => Some(Control::Continue),
        BTN_ADD_ITEM => Some(Control::AddItem),
        BTN_FINISH_ITEMS => Some(Control::Finish),
        _ => None,
    }
}

fn reply(rows: &[&[&str]], one_time: bool) -> Keyboard {
    Keyboard::Reply {
        rows: rows
            .iter()
            .map(|row| row.iter().map(|s| s.to_string()).collect())
            .collect(),
        one_time,
    }
}

pub fn main_menu() -> Keyboard {
    reply(&[&[BTN_MAKE_APPLICATION]], false)
}

pub fn step_control() -> Keyboard {
    reply(&[&[BTN_CANCEL, BTN_SUPPORT]], false)
}

/// Quantity and contract steps: skip on top of the step controls.
pub fn skip_control() -> Keyboard {
    reply(&[&[BTN_SKIP], &[BTN_CANCEL, BTN_SUPPORT]], false)
}

pub fn items_done() -> Keyboard {
    reply(
        &[&[BTN_ADD_ITEM, BTN_FINISH_ITEMS], &[BTN_CANCEL, BTN_SUPPORT]],
        false,
    )
}

pub fn continue_keyboard() -> Keyboard {
    reply(&[&[BTN_CONTINUE], &[BTN_CANCEL]], false)
}

pub fn company_picker(companies: &[String]) -> Keyboard {
    Keyboard::Reply {
        rows: vec![
            companies.to_vec(),
            vec![BTN_CANCEL.to_string(), BTN_SUPPORT.to_string()],
        ],
        one_time: true,
    }
}

/// Two labels per row.
pub fn category_picker(labels: &[String]) -> Keyboard {
    Keyboard::Reply {
        rows: labels.chunks(2).map(<[String]>::to_vec).collect(),
        one_time: true,
    }
}

pub fn navigator_panel() -> Keyboard {
    reply(&[&[BTN_BROADCAST, BTN_DIRECT]], false)
}

pub fn broadcast_actions() -> Keyboard {
    Keyboard::Inline(vec![
        vec![
            InlineButton::new("📤 Отправить сейчас", CB_BROADCAST_SEND_NOW),
            InlineButton::new("⏰ Запланировать", CB_BROADCAST_SCHEDULE),
        ],
        vec![InlineButton::new("❌ Отменить", CB_BROADCAST_CANCEL)],
    ])
}

pub fn approval_buttons(approve: &str, revise: &str) -> Keyboard {
    Keyboard::Inline(vec![vec![
        InlineButton::new(BTN_APPROVE, approve),
        InlineButton::new(BTN_REVISE, revise),
    ]])
}

/// Keyboard shown with the prompt and notices of `stage`.
pub fn keyboard_for(stage: Stage, companies: &[String]) -> Keyboard {
    match stage {
        Stage::Idle => main_menu(),
        Stage::ChooseCompany => company_picker(companies),
        Stage::AwaitItemQty | Stage::AwaitContract => skip_control(),
        Stage::AskMoreItems => items_done(),
        Stage::AwaitContinue => continue_keyboard(),
        Stage::AwaitTaxId
        | Stage::AwaitLegalName
        | Stage::AwaitItemName
        | Stage::AwaitItemUnit
        | Stage::AwaitItemUnitPrice
        | Stage::AwaitItemLineTotal
        | Stage::SupportQuestion => step_control(),
    }
}

/// Prompt for the current stage. Idle and AwaitContinue have none.
pub fn prompt(state: &ConversationState) -> Option<String> {
    let text = match state.stage {
        Stage::Idle | Stage::AwaitContinue => return None,
        Stage::ChooseCompany => "Выберите компанию:".to_string(),
        Stage::AwaitTaxId => "Введите ИНН:".to_string(),
        Stage::AwaitLegalName => "Введите название юр. лица:".to_string(),
        Stage::AwaitItemName => format!(
            "Введите наименование позиции №{}:",
            state.draft.items.len() + 1
        ),
        Stage::AwaitItemQty => "Введите количество (число). Можно «Пропуск» = 1:".to_string(),
        Stage::AwaitItemUnit => {
            "Введите единицу измерения (например: шт, кг, м, усл):".to_string()
        }
        Stage::AwaitItemUnitPrice => {
            "Введите цену за единицу (например: 1000 или 1 000):".to_string()
        }
        Stage::AwaitItemLineTotal if state.current_item.quantity == 1 => {
            "Введите итоговую сумму по позиции (она же цена за единицу, т.к. количество = 1):"
                .to_string()
        }
        Stage::AwaitItemLineTotal => {
            "Введите ОБЩУЮ стоимость по позиции (итого по строке). Это НЕ цена за единицу:"
                .to_string()
        }
        Stage::AskMoreItems => "Добавить ещё позицию или завершить список?".to_string(),
        Stage::AwaitContract => "Введите номер договора:".to_string(),
        Stage::SupportQuestion => SUPPORT_PROMPT.to_string(),
    };
    Some(text)
}

pub fn notice(n: &Notice) -> String {
    match n {
        Notice::PickCompany => "Пожалуйста, выберите компанию кнопкой снизу.".into(),
        Notice::BadQuantity => {
            "Введите количество числом (например: 1, 2, 10) или нажмите «Пропуск».".into()
        }
        Notice::BadPrice => "Не смог распознать цену. Пример: 1000 или 1 000".into(),
        Notice::BadTotal => "Не смог распознать сумму. Пример: 1000000 или 1 000 000".into(),
        Notice::NameMismatch { tax_id, official } => format!(
            "По ИНН {} в Rusprofile организация указана как:\n{}\n\n\
             Пожалуйста, введите название юридического лица ещё раз (как в Rusprofile).",
            tax_id, official
        ),
        Notice::TotalMismatch {
            quantity,
            unit_price,
            expected,
            entered,
        } => format!(
            "Сумма не сходится: {} × {:.2} = {:.2}, а вы ввели {:.2}.",
            quantity, unit_price, expected, entered
        ),
        Notice::ReenterPriceAndTotal => {
            "Введите заново цену за единицу и итог по этой позиции.".into()
        }
        Notice::PickOption => "Выберите вариант кнопкой снизу.".into(),
        Notice::SupportEmpty => "Напишите текст или отправьте файл/фото.".into(),
        Notice::SupportQueued => "Вопрос отправлен. Заполнение заявки поставлено на паузу.\n\
             Нажмите «Продолжить», чтобы продолжить с того же шага."
            .into(),
    }
}

/// "—" for blank values.
pub fn or_dash(s: &str) -> &str {
    let t = s.trim();
    if t.is_empty() { "—" } else { t }
}

/// Approval request text posted with the invoice.
pub fn application_summary(user_ref: &str, draft: &Draft) -> String {
    let mut positions = vec!["Позиции:".to_string()];
    positions.extend(draft.items.iter().enumerate().map(|(i, it)| {
        format!(
            "{}) {}; кол-во={}; ед={}; цена={:.2}; итого={:.2}",
            i + 1,
            it.name,
            it.quantity,
            it.unit,
            it.unit_price,
            it.line_total
        )
    }));

    let mut parts = vec![
        "📝 Заявка на подтверждение".to_string(),
        format!("От: {}", user_ref),
        format!("Компания: {}", draft.company),
        format!("ИНН: {}", draft.tax_id),
        format!("Юр.лицо (ввод): {}", draft.legal_name),
        positions.join("\n"),
        format!("Сумма итого: {:.2}", draft.total()),
        format!("Договор: {}", draft.contract),
        String::new(),
        "Данные Rusprofile:".to_string(),
        format!("КПП: {}", or_dash(&draft.registry.kpp)),
        format!("Название: {}", or_dash(&draft.registry.name)),
        format!("Адрес: {}", or_dash(&draft.registry.address)),
    ];
    if let Some(err) = draft.registry_error.as_deref().filter(|e| !e.trim().is_empty()) {
        parts.push(String::new());
        parts.push("⚠️ Ошибка парсинга/получения:".to_string());
        parts.push(err.to_string());
    }
    parts.join("\n")
}

/// Greeting for a returning user: first name, else "@username", else none.
pub fn greeting(user: &UserProfile) -> String {
    let clean = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };
    let name = clean(&user.first_name)
        .or_else(|| clean(&user.username).map(|u| format!("@{}", u)));
    match name {
        Some(name) => format!(
            "Привет, {}!\nУ меня уже есть вся необходимая информация для нашего общения.",
            name
        ),
        None => "Привет!\nУ меня уже есть вся необходимая информация для нашего общения.".into(),
    }
}

pub fn category_chosen(label: &str) -> String {
    format!("Выбрана: {}\nМожете отправлять файлы", label)
}

/// Cut to at most `limit` characters, ending with "…" when cut.
pub fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let mut out: String = s.chars().take(limit.saturating_sub(1)).collect();
    out.push('…');
    out
}
