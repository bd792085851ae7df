//! Conversation builder: OpenAI message list to backend item chain.

use super::config::BotConfig;
use super::error::{BridgeError, BridgeResult};
use super::extract::extract;
use super::fanout::upload_all;
use super::ingest::FileIngestor;
use super::models::resolve_bot;
use super::openai::{ChatCompletionRequest, ChatMessage, MessageContent, Role};
use super::types::{
    BackendRequest, BotChatData, BotChatRequest, BotData, BotToolData, CustomBotData,
    CustomBotRequest, Item, ItemContent, ItemType, ToolData, WELCOME_MARKER,
};

const TRIGGER_BY: &str = "auto";
const LANGUAGE: &str = "auto";
const TASK_TYPE: &str = "chat";
const BOT_NAME: &str = "Test Bot";
const BOT_LOGO_URL: &str = "https://assets.monica.im/assets/img/default_bot_icon.jpg";
const BOT_ORIGIN_TITLE: &str = "Monica Bot Test";

/// How system messages are treated while walking the conversation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SystemHandling {
    Drop,
    Capture,
}

/// Item chain shared by both envelopes.
#[derive(Debug)]
struct Chain {
    conversation_id: String,
    items: Vec<Item>,
    last_item_id: String,
    system_prompt: String,
}

fn new_conversation_id() -> String {
    format!("conv:{}", uuid::Uuid::new_v4())
}

fn message_id() -> String {
    format!("msg:{}", uuid::Uuid::new_v4())
}

fn task_id() -> String {
    format!("task:{}", uuid::Uuid::new_v4())
}

/// Build the backend request selected by `bot`.
///
/// # Errors
/// Returns `EmptyInput` when the request has no messages.
pub async fn build(
    ingestor: &FileIngestor,
    request: &ChatCompletionRequest,
    bot: &BotConfig,
) -> BridgeResult<BackendRequest> {
    if bot.custom_bot_mode {
        build_custom_bot_chat(ingestor, request, bot)
            .await
            .map(BackendRequest::CustomBot)
    } else {
        build_bot_chat(ingestor, request)
            .await
            .map(BackendRequest::BotChat)
    }
}

/// Build a generic bot-chat envelope; system messages are dropped.
///
/// # Errors
/// Returns `EmptyInput` when the request has no messages.
pub async fn build_bot_chat(
    ingestor: &FileIngestor,
    request: &ChatCompletionRequest,
) -> BridgeResult<BotChatRequest> {
    let chain = build_chain(ingestor, &request.messages, SystemHandling::Drop, true).await?;

    Ok(BotChatRequest {
        task_uid: task_id(),
        bot_uid: resolve_bot(&request.model),
        data: BotChatData {
            conversation_id: chain.conversation_id,
            pre_parent_item_id: chain.last_item_id,
            items: chain.items,
            trigger_by: TRIGGER_BY.to_string(),
            use_model: String::new(),
            is_incognito: true,
            use_new_memory: false,
        },
        language: LANGUAGE.to_string(),
        task_type: TASK_TYPE.to_string(),
        tool_data: ToolData::default(),
    })
}

/// Build a custom-bot envelope; the last system message becomes the bot prompt.
///
/// # Errors
/// Returns `EmptyInput` when the request has no messages.
pub async fn build_custom_bot_chat(
    ingestor: &FileIngestor,
    request: &ChatCompletionRequest,
    bot: &BotConfig,
) -> BridgeResult<CustomBotRequest> {
    let chain = build_chain(ingestor, &request.messages, SystemHandling::Capture, false).await?;
    let bot_uid = bot.bot_uid.clone();

    Ok(CustomBotRequest {
        task_uid: task_id(),
        bot_uid: bot_uid.clone(),
        data: CustomBotData {
            conversation_id: chain.conversation_id,
            items: chain.items,
            pre_generated_reply_id: message_id(),
            pre_parent_item_id: chain.last_item_id,
            origin: format!("https://monica.im/bots/{bot_uid}"),
            origin_page_title: BOT_ORIGIN_TITLE.to_string(),
            trigger_by: TRIGGER_BY.to_string(),
            use_model: request.model.clone(),
            is_incognito: false,
            use_new_memory: true,
            use_memory_suggestion: true,
        },
        language: LANGUAGE.to_string(),
        locale: bot.locale.clone(),
        task_type: TASK_TYPE.to_string(),
        bot_data: BotData {
            description: BOT_NAME.to_string(),
            logo_url: BOT_LOGO_URL.to_string(),
            name: BOT_NAME.to_string(),
            classification: "custom".to_string(),
            prompt: chain.system_prompt,
            kind: "custom_bot".to_string(),
            uid: bot_uid,
            example_list: Vec::new(),
            tool_data: BotToolData {
                use_model: request.model.clone(),
                ..BotToolData::default()
            },
        },
        ai_resp_language: bot.response_language.clone(),
    })
}

async fn build_chain(
    ingestor: &FileIngestor,
    messages: &[ChatMessage],
    system: SystemHandling,
    incognito: bool,
) -> BridgeResult<Chain> {
    if messages.is_empty() {
        return Err(BridgeError::EmptyInput);
    }

    let conversation_id = new_conversation_id();
    let root = Item {
        conversation_id: conversation_id.clone(),
        parent_item_id: String::new(),
        item_id: message_id(),
        item_type: ItemType::Reply,
        data: ItemContent::text(WELCOME_MARKER),
    };
    let mut last_item_id = root.item_id.clone();
    let mut items = Vec::with_capacity(messages.len() + 1);
    items.push(root);
    let mut system_prompt = String::new();

    for message in messages {
        if message.role == Role::System {
            if system == SystemHandling::Capture {
                system_prompt = message.joined_text();
            }
            continue;
        }

        let item_type = if message.role == Role::Assistant {
            ItemType::Reply
        } else {
            ItemType::Question
        };

        let content = match &message.content {
            Some(MessageContent::Parts(parts)) => {
                let extraction = extract(parts);
                if extraction.attachments.is_empty() {
                    ItemContent::text(extraction.text)
                } else {
                    let file_infos =
                        upload_all(ingestor, extraction.attachments, ingestor.config()).await;
                    ItemContent::with_files(extraction.text, file_infos)
                }
            }
            Some(MessageContent::Text(text)) => ItemContent::text(text.clone()),
            None => ItemContent::text(String::new()),
        };

        let item = Item {
            conversation_id: conversation_id.clone(),
            parent_item_id: last_item_id,
            item_id: message_id(),
            item_type,
            data: content.incognito(incognito),
        };
        last_item_id = item.item_id.clone();
        items.push(item);
    }

    tracing::debug!(
        conversation_id = %conversation_id,
        items = items.len(),
        "Built conversation chain"
    );

    Ok(Chain {
        conversation_id,
        items,
        last_item_id,
        system_prompt,
    })
}
