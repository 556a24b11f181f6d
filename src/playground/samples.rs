/// Editor contents a fresh playground starts with.
pub const DEFAULT_PROGRAM: &str = r#"interface Joke {
    setup: string;
    punchline: string;
}

async function fetchRandomJoke(): Promise<Joke> {
    const response = await fetch('https://official-joke-api.appspot.com/random_joke');
    return response.json();
}

fetchRandomJoke().then(joke => {
    console.log(`${joke.setup} - ${joke.punchline}`);
});"#;
